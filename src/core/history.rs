use super::{AlertHistoryEntry, AlertStatus, HistoryAction, Transition};

/// Why a history trail could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    Empty,
    FirstNotCreated(HistoryAction),
    IllegalStep { index: usize, from: AlertStatus, action: HistoryAction },
}

/// Replay an alert's history, oldest first, and return the status it implies.
///
/// `created` yields `Active`; `assigned` and `note` leave the status alone but
/// `assigned` must still be legal from where the trail currently stands.
pub fn replay(entries: &[AlertHistoryEntry]) -> Result<AlertStatus, ReplayError> {
    let first = entries.first().ok_or(ReplayError::Empty)?;
    if first.action != HistoryAction::Created {
        return Err(ReplayError::FirstNotCreated(first.action));
    }

    let mut status = AlertStatus::Active;
    for (index, entry) in entries.iter().enumerate().skip(1) {
        let transition = match entry.action {
            HistoryAction::Acknowledged => Transition::Acknowledge,
            HistoryAction::Resolved => Transition::Resolve,
            HistoryAction::Assigned => Transition::Assign,
            HistoryAction::Note => continue,
            HistoryAction::Created => {
                return Err(ReplayError::IllegalStep { index, from: status, action: entry.action });
            }
        };
        status = status.apply(transition).ok_or(ReplayError::IllegalStep {
            index,
            from: status,
            action: entry.action,
        })?;
    }
    Ok(status)
}
