//! Scripted board sessions.
//!
//! A script is a JSON array of steps, each tagged by `op`:
//!
//! ```json
//! [
//!   { "op": "move", "item": "t3", "to": { "column": "todo", "index": 0 } },
//!   { "op": "delete", "item": "t1" },
//!   { "op": "wait", "ms": 2000 },
//!   { "op": "undo", "id": "t1" }
//! ]
//! ```

use crate::error::{AppError, Result};
use kanban_engine::{
    ActionId, Board, DropOutcome, DropTarget, GatewayError, InMemoryGateway,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Where a card is dropped. `before` wins over `column`; `index` needs `column`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl Target {
    fn to_drop_target(&self) -> Option<DropTarget> {
        match (&self.before, &self.column, self.index) {
            (Some(sibling), _, _) => Some(DropTarget::Sibling(sibling.clone())),
            (None, Some(column), Some(index)) => Some(DropTarget::Index {
                container_id: column.clone(),
                index,
            }),
            (None, Some(column), None) => Some(DropTarget::Container(column.clone())),
            (None, None, _) => None,
        }
    }
}

/// One step of a session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Drag and drop in one go; no `to` means dropped outside the board.
    Move {
        item: String,
        #[serde(default)]
        to: Option<Target>,
    },
    DragStart {
        item: String,
    },
    Drop {
        #[serde(default)]
        to: Option<Target>,
    },
    CancelDrag,
    MoveColumn {
        column: String,
        index: usize,
    },
    Delete {
        item: String,
        #[serde(default)]
        label: Option<String>,
    },
    DeleteColumn {
        column: String,
    },
    /// Undo the deletion of the card or column with this id.
    Undo {
        id: String,
    },
    Dismiss {
        id: String,
    },
    Wait {
        ms: u64,
    },
    /// Replace the view with the gateway's board.
    Refetch,
    Rebalance {
        column: String,
    },
    FailNextReorder {
        reason: String,
    },
    FailNextDelete {
        reason: String,
    },
    Drift {
        position: f64,
    },
    Print,
}

/// Parse a session script.
pub fn parse(json: &str) -> Result<Vec<Step>> {
    Ok(serde_json::from_str(json)?)
}

/// Tally of what happened during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub committed: usize,
    pub drifted: usize,
    pub rejected: usize,
    pub rolled_back: usize,
    pub cancelled: usize,
    pub deletions: usize,
    pub undone: usize,
}

impl Summary {
    fn record<T>(&mut self, outcome: &DropOutcome<T>) {
        match outcome {
            DropOutcome::Committed { drift, .. } => {
                self.committed += 1;
                if *drift {
                    self.drifted += 1;
                }
            }
            DropOutcome::Rejected(_) => self.rejected += 1,
            DropOutcome::RolledBack(_) => self.rolled_back += 1,
            DropOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// A board plus the gateway behind it, driven step by step.
pub struct Session {
    board: Board,
    gateway: Arc<InMemoryGateway>,
    deletions: HashMap<String, ActionId>,
    summary: Summary,
}

impl Session {
    pub fn new(board: Board, gateway: Arc<InMemoryGateway>) -> Self {
        Self {
            board,
            gateway,
            deletions: HashMap::new(),
            summary: Summary::default(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Run every step in order, stopping at the first one that fails.
    pub async fn run(&mut self, steps: &[Step]) -> Result<Summary> {
        for (i, step) in steps.iter().enumerate() {
            tracing::debug!(step = i + 1, ?step, "Running step");
            self.apply(step).await.map_err(|err| AppError::Step {
                step: i + 1,
                message: err.to_string(),
            })?;
        }
        Ok(self.summary.clone())
    }

    async fn apply(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Move { item, to } => {
                let outcome = match to.as_ref().and_then(Target::to_drop_target) {
                    Some(target) => self.board.move_item(item, target).await?,
                    None => {
                        self.board.coordinator().on_drag_start(item)?;
                        self.board.coordinator().on_drag_end(None).await?
                    }
                };
                tracing::info!(item_id = %item, ?outcome, "Move finished");
                self.summary.record(&outcome);
            }
            Step::DragStart { item } => {
                self.board.coordinator().on_drag_start(item)?;
            }
            Step::Drop { to } => {
                let target = to.as_ref().and_then(Target::to_drop_target);
                let outcome = self.board.coordinator().on_drag_end(target).await?;
                tracing::info!(?outcome, "Drop finished");
                self.summary.record(&outcome);
            }
            Step::CancelDrag => {
                self.board.coordinator().cancel_drag();
            }
            Step::MoveColumn { column, index } => {
                let outcome = self.board.reorder_column(column, *index).await?;
                tracing::info!(container_id = %column, ?outcome, "Column move finished");
                self.summary.record(&outcome);
            }
            Step::Delete { item, label } => {
                let ticket = self.board.delete_item(item, label.as_deref())?;
                self.deletions.insert(item.clone(), ticket.action_id);
                self.summary.deletions += 1;
            }
            Step::DeleteColumn { column } => {
                let ticket = self.board.delete_column(column)?;
                self.deletions.insert(column.clone(), ticket.action_id);
                self.summary.deletions += 1;
            }
            Step::Undo { id } => {
                let action_id = self.action_for(id)?;
                if self.board.undo(action_id).await {
                    self.summary.undone += 1;
                } else {
                    tracing::info!(id = %id, "Nothing to undo");
                }
            }
            Step::Dismiss { id } => {
                let action_id = self.action_for(id)?;
                self.board.dismiss(action_id);
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Step::Refetch => {
                let board = self.gateway.fetch_board().await;
                self.board.reconcile(board);
            }
            Step::Rebalance { column } => match self.board.rebalance_container(column).await {
                Ok(changed) => tracing::info!(container_id = %column, changed, "Column rebalanced"),
                Err(kanban_engine::Error::Gateway(err)) => {
                    tracing::warn!(container_id = %column, error = %err, "Rebalance rolled back");
                    self.summary.rolled_back += 1;
                }
                Err(err) => return Err(err.into()),
            },
            Step::FailNextReorder { reason } => {
                self.gateway
                    .fail_next_reorder(GatewayError::Network(reason.clone()));
            }
            Step::FailNextDelete { reason } => {
                self.gateway
                    .fail_next_delete(GatewayError::Network(reason.clone()));
            }
            Step::Drift { position } => {
                self.gateway.drift_next_reorder(*position);
            }
            Step::Print => {
                tracing::info!("Board:\n{}", self.board.snapshot().to_json_pretty()?);
            }
        }
        Ok(())
    }

    fn action_for(&self, id: &str) -> Result<ActionId> {
        self.deletions
            .get(id)
            .copied()
            .ok_or_else(|| AppError::UnknownDeletion(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_engine::{BoardState, ChannelSurface, Container, EngineConfig, Item};
    use serde_json::json;

    fn session() -> Session {
        let state = BoardState::from_parts(
            vec![
                Container::new("todo", "To do", 1.0),
                Container::new("done", "Done", 2.0).with_wip_limit(1),
            ],
            vec![
                Item::new("t1", "todo", 1.0, json!({"title": "One"})),
                Item::new("t2", "todo", 2.0, json!({"title": "Two"})),
                Item::new("t3", "todo", 3.0, json!({"title": "Three"})),
            ],
        )
        .unwrap();
        let gateway = Arc::new(InMemoryGateway::new(state.clone()));
        let (surface, _rx) = ChannelSurface::new();
        let board = Board::new(state, gateway.clone(), Arc::new(surface), EngineConfig::default());
        Session::new(board, gateway)
    }

    fn order(session: &Session, column: &str) -> Vec<String> {
        session
            .board()
            .snapshot()
            .siblings(column)
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }

    #[test]
    fn parses_steps() {
        let steps = parse(
            r#"[
                {"op": "move", "item": "t3", "to": {"column": "todo", "index": 0}},
                {"op": "move", "item": "t1"},
                {"op": "deleteColumn", "column": "done"},
                {"op": "failNextReorder", "reason": "offline"},
                {"op": "refetch"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            steps[0],
            Step::Move {
                item: "t3".into(),
                to: Some(Target {
                    column: Some("todo".into()),
                    before: None,
                    index: Some(0),
                }),
            }
        );
        assert_eq!(steps[1], Step::Move { item: "t1".into(), to: None });
        assert_eq!(steps[4], Step::Refetch);
    }

    #[test]
    fn unknown_op_is_an_error() {
        assert!(matches!(
            parse(r#"[{"op": "teleport"}]"#),
            Err(AppError::Script(_))
        ));
    }

    #[test]
    fn target_resolution() {
        let before = Target {
            column: Some("todo".into()),
            before: Some("t1".into()),
            index: Some(3),
        };
        assert_eq!(
            before.to_drop_target(),
            Some(DropTarget::Sibling("t1".into()))
        );

        let nowhere = Target {
            column: None,
            before: None,
            index: Some(1),
        };
        assert_eq!(nowhere.to_drop_target(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn replays_a_session() {
        let mut session = session();
        let steps = parse(
            r#"[
                {"op": "move", "item": "t3", "to": {"column": "todo", "index": 0}},
                {"op": "move", "item": "t1", "to": {"column": "done"}},
                {"op": "move", "item": "t2", "to": {"column": "done"}},
                {"op": "failNextReorder", "reason": "offline"},
                {"op": "move", "item": "t2", "to": {"before": "t3"}},
                {"op": "move", "item": "t2"},
                {"op": "delete", "item": "t2"},
                {"op": "wait", "ms": 5000},
                {"op": "undo", "id": "t2"},
                {"op": "delete", "item": "t3"},
                {"op": "wait", "ms": 11000},
                {"op": "refetch"}
            ]"#,
        )
        .unwrap();

        let summary = session.run(&steps).await.unwrap();

        assert_eq!(
            summary,
            Summary {
                committed: 2,
                drifted: 0,
                rejected: 1,
                rolled_back: 1,
                cancelled: 1,
                deletions: 2,
                undone: 1,
            }
        );
        assert_eq!(order(&session, "todo"), vec!["t2"]);
        assert_eq!(order(&session, "done"), vec!["t1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_is_reported_with_its_number() {
        let mut session = session();
        let steps = parse(
            r#"[
                {"op": "print"},
                {"op": "delete", "item": "ghost"}
            ]"#,
        )
        .unwrap();

        let err = session.run(&steps).await.unwrap_err();
        assert!(matches!(err, AppError::Step { step: 2, .. }));
    }
}
