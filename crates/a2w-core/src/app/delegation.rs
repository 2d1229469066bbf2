//! Delegation Manager - builds outbound handoffs and guards against cycles.
//!
//! # Cycle rule
//! The chain lists every agent that already handed the task on. Delegating
//! to `target` is refused when:
//! - `target` already appears in the chain, or
//! - this agent appears anywhere but at the tail (the task came back to us)
//!
//! The same rule guards inbound tasks: a submitted task whose chain already
//! names this agent is refused.

use std::sync::Arc;
use tracing::info;

use crate::domain::{
    A2wError, AgentId, AgentRecord, DelegationChain, DelegationRequest, TaskContext,
};
use crate::ports::{Clock, IdGenerator};

pub struct DelegationManager {
    agent: Arc<AgentRecord>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl DelegationManager {
    pub fn new(agent: Arc<AgentRecord>, ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { agent, ids, clock }
    }

    /// Builds the request that hands `task` to `delegate_to`.
    ///
    /// The forwarded context keeps the `task_id`, carries this agent's weight
    /// as `weight_caller`, and has this agent appended to its chain.
    pub fn build(
        &self,
        task: &TaskContext,
        delegate_to: &AgentId,
        reason: impl Into<String>,
    ) -> Result<DelegationRequest, A2wError> {
        let me = self.agent.agent_id();
        if delegate_to == me {
            return Err(A2wError::CycleDetected {
                target: delegate_to.clone(),
                chain: task.delegation_chain()?,
            });
        }
        if !self.agent.may_delegate_to(delegate_to) {
            return Err(A2wError::PermissionDenied(format!(
                "{me} may not delegate to {delegate_to}"
            )));
        }

        let mut chain = task.delegation_chain()?;
        check_cycle(&chain, me, delegate_to)?;
        chain.push(me.clone());

        let mut forwarded = task.clone();
        forwarded.set_delegation_chain(&chain);
        forwarded.caller_agent = Some(me.clone());
        forwarded.weight_caller = self.agent.weight();

        let request = DelegationRequest {
            delegation_id: self.ids.generate_delegation_id(),
            from_agent: me.clone(),
            delegate_to: delegate_to.clone(),
            reason: reason.into(),
            task: forwarded,
            created_at: self.clock.now(),
        };
        info!(
            task_id = %task.task_id,
            delegation_id = %request.delegation_id,
            %delegate_to,
            %chain,
            "delegation built"
        );
        Ok(request)
    }

    /// Acceptance check for a task submitted to this agent.
    pub fn check_inbound(&self, task: &TaskContext) -> Result<(), A2wError> {
        let me = self.agent.agent_id();
        let chain = task.delegation_chain()?;
        if chain.contains(me) {
            return Err(A2wError::CycleDetected {
                target: me.clone(),
                chain,
            });
        }
        if !self.agent.accepts_caller(task.caller_agent.as_ref()) {
            let caller = task
                .caller_agent
                .as_ref()
                .map_or("<anonymous>", AgentId::as_str);
            return Err(A2wError::PermissionDenied(format!(
                "caller {caller} is not allowed to submit to {me}"
            )));
        }
        Ok(())
    }
}

fn check_cycle(chain: &DelegationChain, me: &AgentId, target: &AgentId) -> Result<(), A2wError> {
    let agents = chain.agents();
    let returned = agents
        .iter()
        .enumerate()
        .any(|(i, agent)| agent == me && i + 1 != agents.len());
    if chain.contains(target) || returned {
        return Err(A2wError::CycleDetected {
            target: target.clone(),
            chain: chain.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, Weight};
    use crate::ports::{SystemClock, UlidGenerator};
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn agent(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    fn manager(me: &str, callers: &[&str], callees: &[&str]) -> DelegationManager {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let record = AgentRecord::new(
            agent(me),
            Weight::new(60).unwrap(),
            callers.iter().map(|c| agent(c)).collect::<BTreeSet<_>>(),
            callees.iter().map(|c| agent(c)).collect::<BTreeSet<_>>(),
        );
        DelegationManager::new(
            Arc::new(record),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        )
    }

    fn task_with_chain(chain: &[&str]) -> TaskContext {
        let mut task = TaskContext::new(TaskId::new("T1").unwrap(), "demo");
        task.set_delegation_chain(&DelegationChain::from(
            chain.iter().map(|a| agent(a)).collect::<Vec<_>>(),
        ));
        task
    }

    #[test]
    fn build_extends_chain_and_sets_caller() {
        let m = manager("B", &[], &["C"]);
        let request = m.build(&task_with_chain(&["A"]), &agent("C"), "specialist").unwrap();

        assert_eq!(request.from_agent, "B");
        assert_eq!(request.task.task_id, "T1");
        assert_eq!(request.task.caller_agent, Some(agent("B")));
        assert_eq!(request.task.weight_caller, Weight::new(60).unwrap());
        assert_eq!(
            request.task.delegation_chain().unwrap(),
            DelegationChain::from(vec![agent("A"), agent("B")])
        );
        assert!(request.delegation_id.as_str().starts_with("dlg-"));
    }

    #[rstest]
    #[case(&["A", "B"], "A")]
    #[case(&["A", "B"], "B")]
    #[case(&["B", "A"], "C")]
    fn cycles_are_detected(#[case] chain: &[&str], #[case] target: &str) {
        let m = manager("B", &[], &["A", "B", "C"]);
        let err = m.build(&task_with_chain(chain), &agent(target), "").unwrap_err();
        assert!(matches!(err, A2wError::CycleDetected { .. }));
    }

    #[test]
    fn self_at_the_tail_is_not_a_cycle() {
        let m = manager("B", &[], &["C"]);
        let request = m.build(&task_with_chain(&["A", "B"]), &agent("C"), "").unwrap();
        assert_eq!(request.task.delegation_chain().unwrap().len(), 2);
    }

    #[test]
    fn unlisted_callee_is_denied() {
        let m = manager("B", &[], &["C"]);
        let err = m.build(&task_with_chain(&[]), &agent("D"), "").unwrap_err();
        assert!(matches!(err, A2wError::PermissionDenied(_)));
    }

    #[test]
    fn inbound_chain_naming_us_is_a_cycle() {
        let m = manager("A", &[], &[]);
        let err = m.check_inbound(&task_with_chain(&["A", "B"])).unwrap_err();
        assert!(matches!(err, A2wError::CycleDetected { .. }));
        m.check_inbound(&task_with_chain(&["X", "B"])).unwrap();
    }

    #[test]
    fn inbound_caller_must_be_allowed_when_listed() {
        let m = manager("A", &["B"], &[]);
        let allowed = task_with_chain(&[]).with_caller(agent("B"));
        let denied = task_with_chain(&[]).with_caller(agent("Z"));

        m.check_inbound(&allowed).unwrap();
        assert!(matches!(m.check_inbound(&denied), Err(A2wError::PermissionDenied(_))));
        assert!(matches!(
            m.check_inbound(&task_with_chain(&[])),
            Err(A2wError::PermissionDenied(_))
        ));
    }
}
