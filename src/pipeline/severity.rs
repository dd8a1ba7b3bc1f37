//! Severity ranking for state transitions
//!
//! Each target phase has its own table with a floor. Dispatch is an exhaustive
//! match over `TokenPhase`, so a new phase cannot be added without a rule.

use super::types::{Severity, TokenPhase, TransitionDetails, TransitionTrigger};

/// Rank cut-offs per phase
mod severity_thresholds {
    pub const IGNITION_MULTI_EARLY: usize = 2;

    pub const COORDINATION_S3: usize = 4;
    pub const COORDINATION_S4: usize = 5;
    pub const COORDINATION_S5: usize = 6;

    pub const EARLY_PHASE_SUSTAINED_SECS: i64 = 180;
    pub const EARLY_PHASE_MIN_EARLY: usize = 3;

    pub const PERSISTENCE_S4: usize = 3;
    pub const PERSISTENCE_S5: usize = 4;

    pub const EXPANSION_S3: usize = 2;

    pub const PRESSURE_S4: usize = 7;
    pub const PRESSURE_S5: usize = 10;

    pub const EXHAUSTION_S4: f64 = 0.70;
    pub const EXHAUSTION_S5: f64 = 0.80;
}

use severity_thresholds::*;

/// Remembers the last emitted severity so DISSIPATION can tell a strong unwind
/// from a weak one. The memory resets when a transition starts a new episode.
#[derive(Debug, Clone, Default)]
pub struct SeverityCalculator {
    last_severity: Option<Severity>,
}

impl SeverityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_severity(&self) -> Option<Severity> {
        self.last_severity
    }

    /// Rank a transition into `to`. Transitions into QUIET carry no rank.
    pub fn calculate(
        &mut self,
        to: TokenPhase,
        trigger: TransitionTrigger,
        details: &TransitionDetails,
    ) -> Option<Severity> {
        if trigger.is_new_episode() {
            self.last_severity = None;
        }

        let severity = match to {
            TokenPhase::Quiet => None,
            TokenPhase::Ignition => Some(ignition(details)),
            TokenPhase::CoordinationSpike => Some(coordination_spike(details)),
            TokenPhase::EarlyPhase => Some(early_phase(details)),
            TokenPhase::PersistenceConfirmed => Some(persistence_confirmed(details)),
            TokenPhase::ParticipationExpansion => Some(participation_expansion(trigger, details)),
            TokenPhase::PressurePeaking => Some(pressure_peaking(details)),
            TokenPhase::ExhaustionDetected => Some(exhaustion_detected(details)),
            TokenPhase::Dissipation => Some(self.dissipation()),
        };

        if severity.is_some() {
            self.last_severity = severity;
        }
        severity
    }

    fn dissipation(&self) -> Severity {
        match self.last_severity {
            Some(Severity::S4) | Some(Severity::S5) => Severity::S4,
            _ => Severity::S2,
        }
    }
}

fn ignition(details: &TransitionDetails) -> Severity {
    if details.early_wallet_count.unwrap_or(0) >= IGNITION_MULTI_EARLY {
        Severity::S2
    } else {
        Severity::S1
    }
}

fn coordination_spike(details: &TransitionDetails) -> Severity {
    match details.coordinated_count.unwrap_or(0) {
        n if n >= COORDINATION_S5 => Severity::S5,
        n if n >= COORDINATION_S4 => Severity::S4,
        n if n >= COORDINATION_S3 => Severity::S3,
        _ => Severity::S2,
    }
}

fn early_phase(details: &TransitionDetails) -> Severity {
    let sustained = details.duration_secs.unwrap_or(0) >= EARLY_PHASE_SUSTAINED_SECS;
    let broad = details.early_wallet_count.unwrap_or(0) >= EARLY_PHASE_MIN_EARLY;
    if sustained && broad {
        Severity::S3
    } else {
        Severity::S2
    }
}

fn persistence_confirmed(details: &TransitionDetails) -> Severity {
    match details.persistent_count.unwrap_or(0) {
        n if n >= PERSISTENCE_S5 => Severity::S5,
        n if n >= PERSISTENCE_S4 => Severity::S4,
        _ => Severity::S3,
    }
}

fn participation_expansion(trigger: TransitionTrigger, details: &TransitionDetails) -> Severity {
    if trigger.is_reversal() {
        return Severity::S4;
    }
    if details.new_wallet_count.unwrap_or(0) >= EXPANSION_S3 {
        Severity::S3
    } else {
        Severity::S2
    }
}

fn pressure_peaking(details: &TransitionDetails) -> Severity {
    match details.whale_count.unwrap_or(0) {
        n if n >= PRESSURE_S5 => Severity::S5,
        n if n >= PRESSURE_S4 => Severity::S4,
        _ => Severity::S3,
    }
}

fn exhaustion_detected(details: &TransitionDetails) -> Severity {
    let pct = details
        .exhaustion
        .as_ref()
        .map_or(0.0, |exhaustion| exhaustion.disengagement_pct);
    if pct >= EXHAUSTION_S5 {
        Severity::S5
    } else if pct >= EXHAUSTION_S4 {
        Severity::S4
    } else {
        Severity::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ExhaustionDetail;

    fn rank(
        calc: &mut SeverityCalculator,
        to: TokenPhase,
        trigger: TransitionTrigger,
        details: TransitionDetails,
    ) -> Option<Severity> {
        calc.calculate(to, trigger, &details)
    }

    #[test]
    fn test_ignition_by_early_wallets() {
        let mut calc = SeverityCalculator::new();
        let one = TransitionDetails {
            early_wallet_count: Some(1),
            ..Default::default()
        };
        let two = TransitionDetails {
            early_wallet_count: Some(2),
            ..Default::default()
        };
        assert_eq!(
            rank(&mut calc, TokenPhase::Ignition, TransitionTrigger::NewEpisode, one),
            Some(Severity::S1)
        );
        assert_eq!(
            rank(&mut calc, TokenPhase::Ignition, TransitionTrigger::NewEpisode, two),
            Some(Severity::S2)
        );
    }

    #[test]
    fn test_coordination_scale() {
        let mut calc = SeverityCalculator::new();
        let expected = [
            (3, Severity::S2),
            (4, Severity::S3),
            (5, Severity::S4),
            (6, Severity::S5),
            (9, Severity::S5),
        ];
        for (count, severity) in expected {
            let details = TransitionDetails {
                coordinated_count: Some(count),
                ..Default::default()
            };
            assert_eq!(
                rank(
                    &mut calc,
                    TokenPhase::CoordinationSpike,
                    TransitionTrigger::CoordinatedEarlyWallets,
                    details
                ),
                Some(severity),
                "coordinated count {}",
                count
            );
        }
    }

    #[test]
    fn test_early_phase_escalation() {
        let mut calc = SeverityCalculator::new();
        let short = TransitionDetails {
            duration_secs: Some(120),
            early_wallet_count: Some(5),
            ..Default::default()
        };
        let sustained = TransitionDetails {
            duration_secs: Some(180),
            early_wallet_count: Some(3),
            ..Default::default()
        };
        let narrow = TransitionDetails {
            duration_secs: Some(400),
            early_wallet_count: Some(2),
            ..Default::default()
        };
        let trigger = TransitionTrigger::SustainedCoordination;
        assert_eq!(rank(&mut calc, TokenPhase::EarlyPhase, trigger, short), Some(Severity::S2));
        assert_eq!(rank(&mut calc, TokenPhase::EarlyPhase, trigger, sustained), Some(Severity::S3));
        assert_eq!(rank(&mut calc, TokenPhase::EarlyPhase, trigger, narrow), Some(Severity::S2));
    }

    #[test]
    fn test_persistence_and_pressure_floors() {
        let mut calc = SeverityCalculator::new();
        for (count, severity) in [(2, Severity::S3), (3, Severity::S4), (4, Severity::S5)] {
            let details = TransitionDetails {
                persistent_count: Some(count),
                ..Default::default()
            };
            assert_eq!(
                rank(
                    &mut calc,
                    TokenPhase::PersistenceConfirmed,
                    TransitionTrigger::PersistentWallets,
                    details
                ),
                Some(severity)
            );
        }

        for (count, severity) in [(5, Severity::S3), (7, Severity::S4), (10, Severity::S5)] {
            let details = TransitionDetails {
                whale_count: Some(count),
                ..Default::default()
            };
            assert_eq!(
                rank(
                    &mut calc,
                    TokenPhase::PressurePeaking,
                    TransitionTrigger::DensityPeak,
                    details
                ),
                Some(severity)
            );
        }
    }

    #[test]
    fn test_expansion_reversal_is_s4() {
        let mut calc = SeverityCalculator::new();
        let one = TransitionDetails {
            new_wallet_count: Some(1),
            ..Default::default()
        };
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::ParticipationExpansion,
                TransitionTrigger::NewWalletsActive,
                one.clone()
            ),
            Some(Severity::S2)
        );
        let two = TransitionDetails {
            new_wallet_count: Some(2),
            ..Default::default()
        };
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::ParticipationExpansion,
                TransitionTrigger::NewWalletsActive,
                two
            ),
            Some(Severity::S3)
        );
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::ParticipationExpansion,
                TransitionTrigger::WhaleBurstReversal,
                one
            ),
            Some(Severity::S4)
        );
    }

    #[test]
    fn test_exhaustion_by_disengagement() {
        let mut calc = SeverityCalculator::new();
        for (pct, severity) in [(0.6, Severity::S3), (0.7, Severity::S4), (0.85, Severity::S5)] {
            let details = TransitionDetails {
                exhaustion: Some(ExhaustionDetail {
                    silent_count: 0,
                    eligible_count: 0,
                    disengagement_pct: pct,
                    replacement: false,
                }),
                ..Default::default()
            };
            assert_eq!(
                rank(
                    &mut calc,
                    TokenPhase::ExhaustionDetected,
                    TransitionTrigger::EarlyCohortSilent,
                    details
                ),
                Some(severity)
            );
        }
    }

    #[test]
    fn test_dissipation_remembers_strong_move() {
        let mut calc = SeverityCalculator::new();
        let strong = TransitionDetails {
            whale_count: Some(10),
            ..Default::default()
        };
        rank(&mut calc, TokenPhase::PressurePeaking, TransitionTrigger::DensityPeak, strong);
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::Dissipation,
                TransitionTrigger::ActivityCollapsed,
                TransitionDetails::default()
            ),
            Some(Severity::S4)
        );

        // QUIET leaves the memory untouched
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::Quiet,
                TransitionTrigger::EpisodeSilence,
                TransitionDetails::default()
            ),
            None
        );
        assert_eq!(calc.last_severity(), Some(Severity::S4));

        // New episode resets it
        rank(
            &mut calc,
            TokenPhase::Ignition,
            TransitionTrigger::NewEpisode,
            TransitionDetails::default(),
        );
        assert_eq!(
            rank(
                &mut calc,
                TokenPhase::Dissipation,
                TransitionTrigger::ActivityCollapsed,
                TransitionDetails::default()
            ),
            Some(Severity::S2)
        );
    }
}
