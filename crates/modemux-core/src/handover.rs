// ── Make-Before-Break Coordinator ──
//
// Pure observer of the orchestrator's event stream. Holds at most one
// open transaction and never touches a manager directly: it returns
// `HandoverAction`s for the orchestrator to apply on its own queue.
// Cross-manager ordering is sound only because both handover steps are
// observed through the same serialized stream.

use tracing::debug;

use crate::events::ModeEvent;
use crate::manager::ManagerId;
use crate::role::ClientRole;

// ── Live-set view ───────────────────────────────────────────────────

/// Read-only snapshot of the live client managers' roles, rebuilt by the
/// orchestrator before each coordinator invocation.
#[derive(Debug, Clone, Default)]
pub struct LiveClientView {
    pub roles: Vec<(ManagerId, ClientRole)>,
}

impl LiveClientView {
    pub fn role_of(&self, id: ManagerId) -> Option<ClientRole> {
        self.roles
            .iter()
            .find(|(m, _)| *m == id)
            .map(|(_, role)| *role)
    }

    pub fn primary(&self) -> Option<ManagerId> {
        self.roles
            .iter()
            .find(|(_, role)| *role == ClientRole::Primary)
            .map(|(id, _)| *id)
    }

    fn secondary_transients(&self) -> Vec<ManagerId> {
        let mut ids: Vec<ManagerId> = self
            .roles
            .iter()
            .filter(|(_, role)| *role == ClientRole::SecondaryTransient)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// What the orchestrator should do to a client manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverAction {
    /// Move the current primary down to `SecondaryTransient`.
    Demote { id: ManagerId },
    /// Move a `SecondaryTransient` manager up to `Primary`.
    Promote { id: ManagerId },
    /// Tear down a leftover secondary.
    Stop { id: ManagerId },
}

// ── Coordinator ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transaction {
    old: ManagerId,
    new: ManagerId,
}

/// Two-step make-before-break protocol plus the no-primary failsafe.
#[derive(Debug, Default)]
pub struct MakeBeforeBreak {
    transaction: Option<Transaction>,
}

impl MakeBeforeBreak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_open(&self) -> bool {
        self.transaction.is_some()
    }

    /// Feed one published event plus the post-event live view. Returned
    /// actions are applied by the caller in order.
    pub fn on_event(&mut self, event: &ModeEvent, view: &LiveClientView) -> Vec<HandoverAction> {
        let mut actions = match event {
            ModeEvent::L3Validated { id } => self.on_validated(*id, view),
            ModeEvent::ClientRoleChanged { id, new, .. } => self.on_role_changed(*id, *new, view),
            ModeEvent::ManagerRemoved { id, .. } => {
                self.abort_if_involved(*id);
                Vec::new()
            }
            _ => Vec::new(),
        };
        // The failsafe never runs over a promotion already in flight.
        let promoting = actions
            .iter()
            .any(|a| matches!(a, HandoverAction::Promote { .. }));
        if !promoting {
            actions.extend(self.failsafe(view));
        }
        actions
    }

    /// Step 1: a validated `SecondaryTransient` either opens a
    /// transaction against the current primary or, absent one, is
    /// promoted outright.
    fn on_validated(&mut self, id: ManagerId, view: &LiveClientView) -> Vec<HandoverAction> {
        if view.role_of(id) != Some(ClientRole::SecondaryTransient) {
            return Vec::new();
        }
        if let Some(tx) = self.transaction {
            debug!(%id, old = %tx.old, new = %tx.new, "validation ignored: handover already open");
            return Vec::new();
        }
        match view.primary() {
            Some(old) => {
                self.transaction = Some(Transaction { old, new: id });
                debug!(%old, new = %id, "handover opened");
                vec![HandoverAction::Demote { id: old }]
            }
            None => vec![HandoverAction::Promote { id }],
        }
    }

    /// Step 2: the old primary landed in `SecondaryTransient`; promote
    /// the transaction's `new` if both parties are still eligible.
    fn on_role_changed(
        &mut self,
        id: ManagerId,
        new_role: ClientRole,
        view: &LiveClientView,
    ) -> Vec<HandoverAction> {
        let Some(tx) = self.transaction else {
            return Vec::new();
        };
        if id != tx.old || new_role != ClientRole::SecondaryTransient {
            return Vec::new();
        }
        self.transaction = None;
        let both_eligible = view.role_of(tx.old) == Some(ClientRole::SecondaryTransient)
            && view.role_of(tx.new) == Some(ClientRole::SecondaryTransient);
        if both_eligible {
            debug!(old = %tx.old, new = %tx.new, "handover completing");
            vec![HandoverAction::Promote { id: tx.new }]
        } else {
            debug!(old = %tx.old, new = %tx.new, "handover aborted: party no longer eligible");
            Vec::new()
        }
    }

    fn abort_if_involved(&mut self, id: ManagerId) {
        if let Some(tx) = self.transaction
            && (tx.old == id || tx.new == id)
        {
            debug!(%id, "handover aborted: party removed");
            self.transaction = None;
        }
    }

    /// The device must never sit without a primary outside an active
    /// handover: promote the lowest-id `SecondaryTransient` and stop the
    /// rest.
    fn failsafe(&mut self, view: &LiveClientView) -> Vec<HandoverAction> {
        if view.primary().is_some() {
            return Vec::new();
        }
        let transients = view.secondary_transients();
        let eligible = transients.len() == 1
            || (transients.len() > 1 && self.transaction.is_none());
        if !eligible {
            return Vec::new();
        }
        self.transaction = None;
        let mut iter = transients.into_iter();
        let Some(winner) = iter.next() else {
            return Vec::new();
        };
        debug!(%winner, "failsafe promotion");
        let mut actions = vec![HandoverAction::Promote { id: winner }];
        actions.extend(iter.map(|id| HandoverAction::Stop { id }));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerKind;
    use pretty_assertions::assert_eq;

    fn view(roles: &[(u64, ClientRole)]) -> LiveClientView {
        LiveClientView {
            roles: roles.iter().map(|(n, r)| (ManagerId(*n), *r)).collect(),
        }
    }

    fn validated(n: u64) -> ModeEvent {
        ModeEvent::L3Validated { id: ManagerId(n) }
    }

    fn role_changed(n: u64, old: ClientRole, new: ClientRole) -> ModeEvent {
        ModeEvent::ClientRoleChanged {
            id: ManagerId(n),
            old: Some(old),
            new,
        }
    }

    #[test]
    fn two_step_handover_demotes_then_promotes() {
        let mut mbb = MakeBeforeBreak::new();

        // Secondary validates while a primary exists: demote the primary.
        let v = view(&[
            (1, ClientRole::Primary),
            (2, ClientRole::SecondaryTransient),
        ]);
        assert_eq!(
            mbb.on_event(&validated(2), &v),
            vec![HandoverAction::Demote { id: ManagerId(1) }]
        );
        assert!(mbb.transaction_open());

        // Demotion lands: promote the new manager, transaction closed.
        let v = view(&[
            (1, ClientRole::SecondaryTransient),
            (2, ClientRole::SecondaryTransient),
        ]);
        assert_eq!(
            mbb.on_event(
                &role_changed(1, ClientRole::Primary, ClientRole::SecondaryTransient),
                &v
            ),
            vec![HandoverAction::Promote { id: ManagerId(2) }]
        );
        assert!(!mbb.transaction_open());
    }

    #[test]
    fn validation_without_primary_promotes_directly() {
        let mut mbb = MakeBeforeBreak::new();
        let v = view(&[(2, ClientRole::SecondaryTransient)]);
        assert_eq!(
            mbb.on_event(&validated(2), &v),
            vec![HandoverAction::Promote { id: ManagerId(2) }]
        );
        assert!(!mbb.transaction_open());
    }

    #[test]
    fn removal_of_either_party_aborts_the_transaction() {
        let mut mbb = MakeBeforeBreak::new();
        let v = view(&[
            (1, ClientRole::Primary),
            (2, ClientRole::SecondaryTransient),
        ]);
        mbb.on_event(&validated(2), &v);
        assert!(mbb.transaction_open());

        // The candidate disappears; primary is still live so no failsafe.
        let v = view(&[(1, ClientRole::Primary)]);
        let actions = mbb.on_event(
            &ModeEvent::ManagerRemoved {
                id: ManagerId(2),
                kind: ManagerKind::Client,
            },
            &v,
        );
        assert!(actions.is_empty());
        assert!(!mbb.transaction_open());
    }

    #[test]
    fn step_two_aborts_when_candidate_changed_role() {
        let mut mbb = MakeBeforeBreak::new();
        let v = view(&[
            (1, ClientRole::Primary),
            (2, ClientRole::SecondaryTransient),
        ]);
        mbb.on_event(&validated(2), &v);

        // By the time the demotion lands, the candidate is long-lived.
        let v = view(&[
            (1, ClientRole::SecondaryTransient),
            (2, ClientRole::SecondaryLongLived),
        ]);
        let actions = mbb.on_event(
            &role_changed(1, ClientRole::Primary, ClientRole::SecondaryTransient),
            &v,
        );
        // No promotion; the failsafe takes the remaining transient.
        assert_eq!(
            actions,
            vec![HandoverAction::Promote { id: ManagerId(1) }]
        );
        assert!(!mbb.transaction_open());
    }

    #[test]
    fn failsafe_promotes_lowest_id_and_stops_the_rest() {
        let mut mbb = MakeBeforeBreak::new();
        let v = view(&[
            (7, ClientRole::SecondaryTransient),
            (3, ClientRole::SecondaryTransient),
            (5, ClientRole::ScanOnly),
        ]);
        let actions = mbb.on_event(
            &ModeEvent::ManagerRemoved {
                id: ManagerId(1),
                kind: ManagerKind::Client,
            },
            &v,
        );
        assert_eq!(
            actions,
            vec![
                HandoverAction::Promote { id: ManagerId(3) },
                HandoverAction::Stop { id: ManagerId(7) },
            ]
        );
    }

    #[test]
    fn failsafe_holds_off_while_a_transaction_covers_multiple_transients() {
        let mut mbb = MakeBeforeBreak::new();
        let v = view(&[
            (1, ClientRole::Primary),
            (2, ClientRole::SecondaryTransient),
            (3, ClientRole::SecondaryTransient),
        ]);
        mbb.on_event(&validated(2), &v);
        assert!(mbb.transaction_open());

        // Primary demoted but the role-change event has not been seen for
        // it as tx.old yet (e.g. an unrelated event slips in first):
        // three transients, no primary, open transaction -> hold off.
        let v = view(&[
            (1, ClientRole::SecondaryTransient),
            (2, ClientRole::SecondaryTransient),
            (3, ClientRole::SecondaryTransient),
        ]);
        let actions = mbb.on_event(
            &ModeEvent::SoftApStationsChanged {
                id: ManagerId(9),
                connected: 1,
            },
            &v,
        );
        assert!(actions.is_empty());
        assert!(mbb.transaction_open());
    }
}
