use super::control_loop::SchedulerCore;
use super::SchedulerPorts;
use crate::error::Result;
use crate::node::LogicalNode;
use crate::resources::{Offer, OfferOperation, OfferPlan};
use crate::state::SchedulerRuntimeState;
use crate::types::{OfferId, PersistenceId};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What was sent back for one offer.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferDecision {
    Accept {
        offer_id: OfferId,
        operations: Vec<OfferOperation>,
    },
    Decline {
        offer_id: OfferId,
    },
}

impl OfferDecision {
    fn from_plan(plan: &OfferPlan) -> Self {
        let operations = plan.operations();
        if operations.is_empty() {
            Self::Decline {
                offer_id: plan.id().clone(),
            }
        } else {
            Self::Accept {
                offer_id: plan.id().clone(),
                operations,
            }
        }
    }

    #[must_use]
    pub const fn offer_id(&self) -> &OfferId {
        match self {
            Self::Accept { offer_id, .. } | Self::Decline { offer_id } => offer_id,
        }
    }

    #[must_use]
    pub fn operations(&self) -> &[OfferOperation] {
        match self {
            Self::Accept { operations, .. } => operations,
            Self::Decline { .. } => &[],
        }
    }

    /// Operation kinds in submission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.operations().iter().map(OfferOperation::as_str).collect()
    }
}

type NodeKey = (String, PersistenceId);

fn candidates<F>(state: &SchedulerRuntimeState, filter: F) -> Vec<NodeKey>
where
    F: Fn(&LogicalNode) -> bool,
{
    state
        .clusters()
        .values()
        .flat_map(|cluster| {
            cluster
                .nodes()
                .values()
                .filter(|node| node.can_be_scheduled() && !node.needs_to_be_reconciled())
                .filter(|node| filter(node))
                .map(|node| (cluster.name().to_string(), node.persistence_id().clone()))
        })
        .collect()
}

fn node_mut<'a>(state: &'a mut SchedulerRuntimeState, key: &NodeKey) -> Option<&'a mut LogicalNode> {
    state.cluster_mut(&key.0)?.node_mut(&key.1)
}

fn bound_to(node: &LogicalNode, plan: &OfferPlan) -> bool {
    node.agent_id() == Some(plan.agent_id()) || node.hostname() == Some(plan.hostname())
}

impl<P> SchedulerCore<P>
where
    P: SchedulerPorts + 'static,
{
    /// Matches a batch of offers against every node that wants resources and
    /// answers each offer with its operations, or declines it.
    ///
    /// # Errors
    /// Returns a store error if a compiled reservation or launch cannot be
    /// persisted; the process must not continue after that.
    pub async fn handle_offers(&self, offers: Vec<Offer>) -> Result<Vec<OfferDecision>> {
        let decisions = {
            let mut state = self.lock().await;
            let role = self.settings.template.role.as_str();
            let batch_volumes: HashSet<PersistenceId> = offers
                .iter()
                .flat_map(|offer| offer.resources.iter())
                .filter(|resource| resource.is_volume() && resource.is_reserved_for(role))
                .filter_map(|resource| resource.persistence_id().cloned())
                .collect();

            let mut decisions = Vec::with_capacity(offers.len());
            for offer in offers {
                let mut plan = OfferPlan::new(offer, &self.settings.template.role);
                debug!("Matching {}", plan);
                self.launch_pass(&mut state, &mut plan).await?;
                if plan.launched() == 0 {
                    plan.release_unused();
                }
                if !self.settings.launch.compatibility_mode {
                    self.forget_lost_reservations(&mut state, &plan, &batch_volumes)
                        .await?;
                    self.reserve_pass(&mut state, &mut plan).await?;
                }
                decisions.push(OfferDecision::from_plan(&plan));
            }
            decisions
        };

        for decision in &decisions {
            self.submit(decision).await;
        }
        Ok(decisions)
    }

    async fn launch_pass(&self, state: &mut SchedulerRuntimeState, plan: &mut OfferPlan) -> Result<()> {
        let compatibility_mode = self.settings.launch.compatibility_mode;
        let launchable = candidates(state, |node| {
            compatibility_mode
                || (node.has_requested_reservation()
                    && bound_to(node, plan)
                    && plan.has_persistence_id(node.persistence_id()))
        });

        for key in &launchable {
            let Some(node) = node_mut(state, key) else {
                continue;
            };
            if node.apply_reserved_offer(plan, &self.settings.launch)? {
                self.persist_locked(state).await?;
            }
        }
        Ok(())
    }

    /// Reserved nodes whose reservation on this agent is gone, or was just
    /// released because nothing could launch on it, start over.
    async fn forget_lost_reservations(
        &self,
        state: &mut SchedulerRuntimeState,
        plan: &OfferPlan,
        batch_volumes: &HashSet<PersistenceId>,
    ) -> Result<()> {
        let released = plan.launched() == 0;
        let lost = candidates(state, |node| {
            node.has_requested_reservation()
                && bound_to(node, plan)
                && (!batch_volumes.contains(node.persistence_id())
                    || (released && plan.has_persistence_id(node.persistence_id())))
        });
        if lost.is_empty() {
            return Ok(());
        }

        for key in &lost {
            if let Some(node) = node_mut(state, key) {
                node.unreserve();
            }
        }
        self.persist_locked(state).await
    }

    async fn reserve_pass(&self, state: &mut SchedulerRuntimeState, plan: &mut OfferPlan) -> Result<()> {
        let reservable = candidates(state, |node| !node.has_requested_reservation());

        for key in &reservable {
            let Some(node) = node_mut(state, key) else {
                continue;
            };
            if node.apply_unreserved_offer(plan) {
                self.persist_locked(state).await?;
            }
        }
        Ok(())
    }

    async fn submit(&self, decision: &OfferDecision) {
        let refuse_seconds = self.settings.refuse_seconds;
        let result = match decision {
            OfferDecision::Accept {
                offer_id,
                operations,
            } => {
                info!(
                    "Accepting offer {} with operations {:?}",
                    offer_id,
                    decision.kinds()
                );
                self.ports
                    .accept_offers(offer_id, operations.clone(), refuse_seconds)
                    .await
            }
            OfferDecision::Decline { offer_id } => {
                debug!("Declining offer {}", offer_id);
                self.ports.decline_offer(offer_id, refuse_seconds).await
            }
        };
        if let Err(e) = result {
            warn!("Answering offer {} failed: {}", decision.offer_id(), e);
        }
    }
}
