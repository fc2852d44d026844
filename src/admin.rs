//! Operator commands against the entitlement engine: `grant|revoke|reduce|status <emailOrId> [days]`.

use chrono::{DateTime, Utc};

use crate::{
    config::{ConfigError, StorageConfig},
    service::{
        entitlement::{DayCount, DayPolicy, EntitlementService, GrantSource, ReduceOutcome},
        ServiceError,
    },
};

pub const USAGE: &str = "Usage: TURSO_URL=... TURSO_TOKEN=... admin <grant|revoke|reduce|status> <emailOrId> [days]";

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Grant { identifier: String, days: DayCount },
    Revoke { identifier: String },
    Reduce { identifier: String, days: DayCount },
    Status { identifier: String },
}

impl AdminCommand {
    /// An unparseable day count falls back to the policy default and anything out of range is clamped.
    pub fn parse(args: &[String], policy: &DayPolicy) -> Result<Self, AdminError> {
        let action = args
            .first()
            .ok_or_else(|| AdminError::Usage("Missing command".to_string()))?;
        let identifier = args
            .get(1)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AdminError::Usage("Missing email or user id".to_string()))?;
        let days = DayCount::parse(args.get(2).map(String::as_str), policy);

        match action.to_lowercase().as_str() {
            "grant" => Ok(AdminCommand::Grant { identifier, days }),
            "revoke" => Ok(AdminCommand::Revoke { identifier }),
            "reduce" => Ok(AdminCommand::Reduce { identifier, days }),
            "status" => Ok(AdminCommand::Status { identifier }),
            other => Err(AdminError::Usage(format!("Unknown command: {}", other))),
        }
    }

    fn identifier(&self) -> &str {
        match self {
            AdminCommand::Grant { identifier, .. }
            | AdminCommand::Revoke { identifier }
            | AdminCommand::Reduce { identifier, .. }
            | AdminCommand::Status { identifier } => identifier,
        }
    }
}

/// Operator commands must reach the real database. The in-memory fallback would start empty and
/// forget every change on exit.
pub fn require_persistent_storage(storage: &StorageConfig) -> Result<(), AdminError> {
    match storage {
        StorageConfig::Turso { .. } => Ok(()),
        StorageConfig::Memory => Err(ConfigError::Missing("TURSO_URL").into()),
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Runs one command and returns the text to print.
pub async fn execute(entitlement: &EntitlementService, command: AdminCommand) -> Result<String, ServiceError> {
    let user = entitlement.resolve_user(command.identifier()).await?;
    let label = match &user.email {
        Some(email) => format!("user {} ({})", user.id, email),
        None => format!("user {}", user.id),
    };

    let text = match command {
        AdminCommand::Grant { days, .. } => {
            let outcome = entitlement.grant(user.id, days, GrantSource::internal(None)).await?;
            format!(
                "Granted {} days to {}. Premium until {}.",
                days,
                label,
                outcome.premium_until.map(format_time).unwrap_or_else(|| "-".to_string())
            )
        }
        AdminCommand::Revoke { .. } => {
            let outcome = entitlement.revoke(user.id).await?;
            if outcome.was_active {
                format!("Revoked premium for {}.", label)
            } else {
                format!("{} had no active premium. Nothing left to revoke.", label)
            }
        }
        AdminCommand::Reduce { days, .. } => match entitlement.reduce(user.id, days).await? {
            ReduceOutcome::Reduced { premium_until, .. } => format!(
                "Reduced premium for {} by {} days. Premium until {}.",
                label,
                days,
                format_time(premium_until)
            ),
            ReduceOutcome::Revoked { .. } => {
                format!("Reduced premium for {} by {} days. Premium has ended.", label, days)
            }
            ReduceOutcome::NothingToReduce { .. } => format!("{} has no active premium to reduce.", label),
        },
        AdminCommand::Status { .. } => {
            let status = entitlement.status(user.id).await?;
            let mut lines = vec![format!("Status for {}:", label)];
            match status.premium_until {
                Some(until) if status.active => {
                    lines.push(format!("  Premium: active until {}", format_time(until)));
                    lines.push(format!("  Days left: {}", status.days_left));
                }
                _ => lines.push("  Premium: inactive".to_string()),
            }
            if let (Some(store), Some(sub_status)) = (status.store, status.subscription_status) {
                lines.push(format!("  Subscription: {} via {}", sub_status, store));
            }
            lines.join("\n")
        }
    };

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::storage::{EntitlementStore, MemoryStore};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        let policy = DayPolicy::default();

        assert_eq!(
            AdminCommand::parse(&args(&["grant", "jane@example.com", "10"]), &policy).unwrap(),
            AdminCommand::Grant {
                identifier: "jane@example.com".to_string(),
                days: DayCount::clamp(10, &policy)
            }
        );
        assert_eq!(
            AdminCommand::parse(&args(&["REVOKE", "5"]), &policy).unwrap(),
            AdminCommand::Revoke {
                identifier: "5".to_string()
            }
        );
        assert_eq!(
            AdminCommand::parse(&args(&["reduce", "5", "abc"]), &policy).unwrap(),
            AdminCommand::Reduce {
                identifier: "5".to_string(),
                days: DayCount::clamp(30, &policy)
            }
        );
        assert_eq!(
            AdminCommand::parse(&args(&["grant", "5", "9999"]), &policy).unwrap(),
            AdminCommand::Grant {
                identifier: "5".to_string(),
                days: DayCount::clamp(360, &policy)
            }
        );
    }

    #[test]
    fn test_parse_usage_errors() {
        let policy = DayPolicy::default();

        assert!(matches!(AdminCommand::parse(&[], &policy), Err(AdminError::Usage(_))));
        assert!(matches!(
            AdminCommand::parse(&args(&["grant"]), &policy),
            Err(AdminError::Usage(_))
        ));
        assert!(matches!(
            AdminCommand::parse(&args(&["extend", "5"]), &policy),
            Err(AdminError::Usage(_))
        ));
    }

    #[test]
    fn test_requires_persistent_storage() {
        assert!(matches!(
            require_persistent_storage(&StorageConfig::Memory),
            Err(AdminError::Config(ConfigError::Missing("TURSO_URL")))
        ));
        assert!(require_persistent_storage(&StorageConfig::Turso {
            url: "libsql://premium.turso.io".to_string(),
            token: "token".to_string(),
        })
        .is_ok());
    }

    #[test]
    fn test_missing_turso_url_is_rejected_from_env_config() {
        let config = crate::config::build_config(|_| None).unwrap();
        let error = require_persistent_storage(&config.storage).unwrap_err();
        assert_eq!(error.to_string(), "Missing TURSO_URL");
    }

    #[tokio::test]
    async fn test_execute_prints_status() {
        let store = MemoryStore::new();
        let user = store.insert_user(Some("jane@example.com")).await.unwrap();
        let entitlement = EntitlementService::new(Arc::new(store), DayPolicy::default());
        let policy = DayPolicy::default();

        let text = execute(
            &entitlement,
            AdminCommand::parse(&args(&["status", "jane@example.com"]), &policy).unwrap(),
        )
        .await
        .unwrap();
        assert!(text.contains("Premium: inactive"));

        let text = execute(
            &entitlement,
            AdminCommand::parse(&args(&["grant", &user.id.to_string(), "10"]), &policy).unwrap(),
        )
        .await
        .unwrap();
        assert!(text.starts_with("Granted 10 days"));

        let text = execute(
            &entitlement,
            AdminCommand::parse(&args(&["status", "jane@example.com"]), &policy).unwrap(),
        )
        .await
        .unwrap();
        assert!(text.contains("Days left: 10"));
        assert!(text.contains("Subscription: ACTIVE via INTERNAL"));

        // Unknown users are reported, not created
        let result = execute(
            &entitlement,
            AdminCommand::parse(&args(&["revoke", "nobody@example.com"]), &policy).unwrap(),
        )
        .await;
        assert!(result.is_err());
    }
}
