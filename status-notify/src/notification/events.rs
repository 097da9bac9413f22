//! Status events.
//!
//! Defines the events that can trigger notifications and their severity levels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level of an event.
///
/// Ordered so that `Minor < Major < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Limited impact, informational.
    #[default]
    Minor,
    /// Significant impact on part of the service.
    Major,
    /// Service unavailable or severely impaired.
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Minor, Severity::Major, Severity::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// The discriminator of a [`NotificationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "incident.opened")]
    IncidentOpened,
    #[serde(rename = "incident.closed")]
    IncidentClosed,
    #[serde(rename = "incident.updated")]
    IncidentUpdated,
    #[serde(rename = "maintenance.scheduled")]
    MaintenanceScheduled,
    #[serde(rename = "maintenance.started")]
    MaintenanceStarted,
    #[serde(rename = "maintenance.completed")]
    MaintenanceCompleted,
    #[serde(rename = "system.down")]
    SystemDown,
    #[serde(rename = "system.degraded")]
    SystemDegraded,
    #[serde(rename = "system.recovered")]
    SystemRecovered,
    #[serde(rename = "slo.breached")]
    SloBreached,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::IncidentOpened,
        EventKind::IncidentClosed,
        EventKind::IncidentUpdated,
        EventKind::MaintenanceScheduled,
        EventKind::MaintenanceStarted,
        EventKind::MaintenanceCompleted,
        EventKind::SystemDown,
        EventKind::SystemDegraded,
        EventKind::SystemRecovered,
        EventKind::SloBreached,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncidentOpened => "incident.opened",
            Self::IncidentClosed => "incident.closed",
            Self::IncidentUpdated => "incident.updated",
            Self::MaintenanceScheduled => "maintenance.scheduled",
            Self::MaintenanceStarted => "maintenance.started",
            Self::MaintenanceCompleted => "maintenance.completed",
            Self::SystemDown => "system.down",
            Self::SystemDegraded => "system.degraded",
            Self::SystemRecovered => "system.recovered",
            Self::SloBreached => "slo.breached",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed)
            .ok_or_else(|| format!("unknown event kind '{}'", trimmed))
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    // ========== Incident Events ==========
    /// A new incident was opened.
    #[serde(rename = "incident.opened")]
    IncidentOpened {
        incident_id: String,
        title: String,
        severity: Severity,
        #[serde(default)]
        affected_systems: Vec<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// An incident was resolved and closed.
    #[serde(rename = "incident.closed")]
    IncidentClosed {
        incident_id: String,
        title: String,
        severity: Severity,
        #[serde(default)]
        affected_systems: Vec<String>,
        #[serde(default)]
        resolution: Option<String>,
        #[serde(default)]
        duration_minutes: Option<u64>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// An open incident received an update.
    #[serde(rename = "incident.updated")]
    IncidentUpdated {
        incident_id: String,
        title: String,
        severity: Severity,
        #[serde(default)]
        affected_systems: Vec<String>,
        update_message: String,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // ========== Maintenance Events ==========
    /// Maintenance window was scheduled.
    #[serde(rename = "maintenance.scheduled")]
    MaintenanceScheduled {
        maintenance_id: String,
        title: String,
        #[serde(default)]
        affected_systems: Vec<String>,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Maintenance window started.
    #[serde(rename = "maintenance.started")]
    MaintenanceStarted {
        maintenance_id: String,
        title: String,
        #[serde(default)]
        affected_systems: Vec<String>,
        #[serde(default)]
        expected_end: Option<DateTime<Utc>>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Maintenance window completed.
    #[serde(rename = "maintenance.completed")]
    MaintenanceCompleted {
        maintenance_id: String,
        title: String,
        #[serde(default)]
        affected_systems: Vec<String>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // ========== System Events ==========
    /// A monitored system stopped responding.
    #[serde(rename = "system.down")]
    SystemDown {
        system_name: String,
        #[serde(default)]
        error_message: Option<String>,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A monitored system responds slowly or partially.
    #[serde(rename = "system.degraded")]
    SystemDegraded {
        system_name: String,
        #[serde(default)]
        response_time_ms: Option<u64>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A previously failing system is healthy again.
    #[serde(rename = "system.recovered")]
    SystemRecovered {
        system_name: String,
        #[serde(default)]
        downtime_minutes: Option<u64>,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // ========== SLO Events ==========
    /// A service level objective was breached.
    #[serde(rename = "slo.breached")]
    SloBreached {
        system_name: String,
        slo_name: String,
        target_percent: f64,
        actual_percent: f64,
        window: String,
        #[serde(default)]
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Get the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::IncidentOpened { .. } => EventKind::IncidentOpened,
            Self::IncidentClosed { .. } => EventKind::IncidentClosed,
            Self::IncidentUpdated { .. } => EventKind::IncidentUpdated,
            Self::MaintenanceScheduled { .. } => EventKind::MaintenanceScheduled,
            Self::MaintenanceStarted { .. } => EventKind::MaintenanceStarted,
            Self::MaintenanceCompleted { .. } => EventKind::MaintenanceCompleted,
            Self::SystemDown { .. } => EventKind::SystemDown,
            Self::SystemDegraded { .. } => EventKind::SystemDegraded,
            Self::SystemRecovered { .. } => EventKind::SystemRecovered,
            Self::SloBreached { .. } => EventKind::SloBreached,
        }
    }

    /// Get the severity of this event.
    ///
    /// Incident events carry their own severity; the others map to a fixed one.
    pub fn severity(&self) -> Severity {
        match self {
            Self::IncidentOpened { severity, .. }
            | Self::IncidentClosed { severity, .. }
            | Self::IncidentUpdated { severity, .. } => *severity,

            Self::SystemDown { .. } => Severity::Critical,
            Self::SystemDegraded { .. } | Self::SloBreached { .. } => Severity::Major,

            Self::MaintenanceScheduled { .. }
            | Self::MaintenanceStarted { .. }
            | Self::MaintenanceCompleted { .. }
            | Self::SystemRecovered { .. } => Severity::Minor,
        }
    }

    /// Names of the systems this event is about.
    pub fn affected_entities(&self) -> Vec<&str> {
        match self {
            Self::IncidentOpened {
                affected_systems, ..
            }
            | Self::IncidentClosed {
                affected_systems, ..
            }
            | Self::IncidentUpdated {
                affected_systems, ..
            }
            | Self::MaintenanceScheduled {
                affected_systems, ..
            }
            | Self::MaintenanceStarted {
                affected_systems, ..
            }
            | Self::MaintenanceCompleted {
                affected_systems, ..
            } => affected_systems.iter().map(String::as_str).collect(),

            Self::SystemDown { system_name, .. }
            | Self::SystemDegraded { system_name, .. }
            | Self::SystemRecovered { system_name, .. }
            | Self::SloBreached { system_name, .. } => vec![system_name.as_str()],
        }
    }

    /// Get a short human-readable title for this event.
    pub fn title(&self) -> String {
        match self {
            Self::IncidentOpened { title, .. } => format!("Incident opened: {}", title),
            Self::IncidentClosed { title, .. } => format!("Incident resolved: {}", title),
            Self::IncidentUpdated { title, .. } => format!("Incident updated: {}", title),
            Self::MaintenanceScheduled { title, .. } => {
                format!("Maintenance scheduled: {}", title)
            }
            Self::MaintenanceStarted { title, .. } => format!("Maintenance started: {}", title),
            Self::MaintenanceCompleted { title, .. } => {
                format!("Maintenance completed: {}", title)
            }
            Self::SystemDown { system_name, .. } => format!("{} is down", system_name),
            Self::SystemDegraded { system_name, .. } => format!("{} is degraded", system_name),
            Self::SystemRecovered { system_name, .. } => format!("{} recovered", system_name),
            Self::SloBreached {
                system_name,
                slo_name,
                ..
            } => format!("SLO breached for {}: {}", system_name, slo_name),
        }
    }

    /// Get a one-paragraph summary of this event.
    pub fn summary(&self) -> String {
        match self {
            Self::IncidentOpened {
                severity,
                affected_systems,
                description,
                ..
            } => {
                let mut text = format!("Severity: {}", severity);
                if !affected_systems.is_empty() {
                    text.push_str(&format!(". Affected: {}", affected_systems.join(", ")));
                }
                if let Some(description) = description {
                    text.push_str(&format!(". {}", description));
                }
                text
            }
            Self::IncidentClosed {
                resolution,
                duration_minutes,
                ..
            } => match (resolution, duration_minutes) {
                (Some(resolution), Some(minutes)) => {
                    format!("{} (open for {})", resolution, format_minutes(*minutes))
                }
                (Some(resolution), None) => resolution.clone(),
                (None, Some(minutes)) => format!("Open for {}", format_minutes(*minutes)),
                (None, None) => "Incident resolved".to_string(),
            },
            Self::IncidentUpdated { update_message, .. } => update_message.clone(),
            Self::MaintenanceScheduled {
                scheduled_start,
                scheduled_end,
                description,
                ..
            } => {
                let window = format!(
                    "{} to {}",
                    scheduled_start.to_rfc3339(),
                    scheduled_end.to_rfc3339()
                );
                match description {
                    Some(description) => format!("{}. {}", window, description),
                    None => window,
                }
            }
            Self::MaintenanceStarted { expected_end, .. } => match expected_end {
                Some(end) => format!("Expected to end at {}", end.to_rfc3339()),
                None => "Maintenance in progress".to_string(),
            },
            Self::MaintenanceCompleted { .. } => "Maintenance finished".to_string(),
            Self::SystemDown {
                error_message,
                status_code,
                ..
            } => match (error_message, status_code) {
                (Some(message), Some(code)) => format!("{} (HTTP {})", message, code),
                (Some(message), None) => message.clone(),
                (None, Some(code)) => format!("HTTP {}", code),
                (None, None) => "No response".to_string(),
            },
            Self::SystemDegraded {
                response_time_ms,
                reason,
                ..
            } => match (reason, response_time_ms) {
                (Some(reason), Some(ms)) => format!("{} ({} ms)", reason, ms),
                (Some(reason), None) => reason.clone(),
                (None, Some(ms)) => format!("Response time {} ms", ms),
                (None, None) => "Degraded performance".to_string(),
            },
            Self::SystemRecovered {
                downtime_minutes, ..
            } => match downtime_minutes {
                Some(minutes) => format!("Down for {}", format_minutes(*minutes)),
                None => "Service restored".to_string(),
            },
            Self::SloBreached {
                target_percent,
                actual_percent,
                window,
                ..
            } => format!(
                "{:.2}% over {} (target {:.2}%)",
                actual_percent, window, target_percent
            ),
        }
    }

    /// Link to more details, when the producer supplied one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::IncidentOpened { url, .. }
            | Self::IncidentClosed { url, .. }
            | Self::IncidentUpdated { url, .. }
            | Self::MaintenanceScheduled { url, .. }
            | Self::MaintenanceStarted { url, .. }
            | Self::MaintenanceCompleted { url, .. }
            | Self::SystemDown { url, .. }
            | Self::SystemDegraded { url, .. }
            | Self::SystemRecovered { url, .. }
            | Self::SloBreached { url, .. } => url.as_deref(),
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::IncidentOpened { timestamp, .. }
            | Self::IncidentClosed { timestamp, .. }
            | Self::IncidentUpdated { timestamp, .. }
            | Self::MaintenanceScheduled { timestamp, .. }
            | Self::MaintenanceStarted { timestamp, .. }
            | Self::MaintenanceCompleted { timestamp, .. }
            | Self::SystemDown { timestamp, .. }
            | Self::SystemDegraded { timestamp, .. }
            | Self::SystemRecovered { timestamp, .. }
            | Self::SloBreached { timestamp, .. } => *timestamp,
        }
    }
}

/// Format a minute count into a human-readable string.
fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;

    if hours > 0 && rest > 0 {
        format!("{}h {}m", hours, rest)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", rest)
    }
}
