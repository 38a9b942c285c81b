//! Champion notifications.
//!
//! Sent once per finalization, after the season has been committed as ended. A failed
//! delivery is logged and counted; it never undoes or blocks the finalization.

use serde::Serialize;
use tracing::{error, info, warn};

use super::SeasonEngine;
use crate::models::{Champion, PlayerId, SeasonScope, TeamId};
use crate::notify::Notification;

/// Delivery counts for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl SeasonEngine {
    /// Notify the champion: the player for group seasons, every roster member for team
    /// seasons.
    pub(crate) async fn notify_champion(
        &self,
        season_name: &str,
        scope: SeasonScope,
        champion: &Champion,
    ) -> FanoutReport {
        let notifications = match scope {
            SeasonScope::Group => vec![player_notification(season_name, champion)],
            SeasonScope::Team => self.team_notifications(season_name, champion).await,
        };

        let mut report = FanoutReport::default();
        for notification in notifications {
            report.attempted += 1;
            match self.notifier.send(&notification).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Champion notification to {} via {} failed: {}",
                        notification.recipient,
                        self.notifier.name(),
                        e
                    );
                }
            }
        }

        info!(
            "Champion fan-out for {:?}: {}/{} delivered",
            season_name, report.delivered, report.attempted
        );
        report
    }

    async fn team_notifications(&self, season_name: &str, champion: &Champion) -> Vec<Notification> {
        let team_id = TeamId::from(champion.id.as_str());
        let members = match self.teams.team_members(&team_id).await {
            Ok(members) => members,
            Err(e) => {
                error!("Could not load roster of champion team {}: {}", team_id, e);
                return Vec::new();
            }
        };

        let mut notifications = Vec::with_capacity(members.len());
        for member in members {
            let name = self.display_name(&member.player_id, None).await;
            let body = if member.is_captain {
                format!(
                    "Congratulations {}! As captain you led {} to the {} title with {} points.",
                    name, champion.display_name, season_name, champion.points
                )
            } else {
                format!(
                    "Congratulations {}! {} won {} with {} points.",
                    name, champion.display_name, season_name, champion.points
                )
            };
            notifications.push(Notification::new(
                member.player_id,
                "Your team is the season champion",
                body,
            ));
        }
        notifications
    }
}

fn player_notification(season_name: &str, champion: &Champion) -> Notification {
    Notification::new(
        PlayerId::from(champion.id.as_str()),
        "You are the season champion",
        format!(
            "Congratulations {}! You won {} with {} points.",
            champion.display_name, season_name, champion.points
        ),
    )
}
