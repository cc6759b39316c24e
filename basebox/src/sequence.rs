//! Drive an ordered list of actions through their test/run/fail contract.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::action::Action;
use crate::core::types::{Branch, SequenceReport};
use crate::session::{DEFAULT_CWD, Session};

/// Dispatch every action once, in order.
///
/// For each action `test` is evaluated fresh; `run` follows if it held,
/// `fail` otherwise. The first error aborts the pass with the action name
/// and branch attached, and later actions are not invoked. There is no
/// rollback: re-running converges because every test is re-evaluated.
#[instrument(skip_all, fields(actions = actions.len()))]
pub fn run_sequence(
    actions: &[Box<dyn Action>],
    session: &mut Session<'_>,
) -> Result<SequenceReport> {
    ensure_unique_names(actions)?;

    let mut report = SequenceReport::default();
    for action in actions {
        let name = action.name();
        session.set_cwd(Some(DEFAULT_CWD));

        let passed = action
            .test(session)
            .with_context(|| format!("action {name} (test)"))?;
        let branch = Branch::from_test(passed);

        println!("task: {name}:{branch}");
        info!(action = name, %branch, "dispatch");

        let outcome = match branch {
            Branch::Run => action.run(session),
            Branch::Fail => action.fail(session),
        };
        outcome.with_context(|| format!("action {name} ({branch})"))?;

        report.push(name, branch);
    }
    Ok(report)
}

fn ensure_unique_names(actions: &[Box<dyn Action>]) -> Result<()> {
    let mut seen = HashSet::new();
    for action in actions {
        if !seen.insert(action.name()) {
            bail!("duplicate action name: {}", action.name());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;

    use super::*;
    use crate::io::config::ProvisionConfig;
    use crate::session::SessionContext;
    use crate::test_support::{FakeRemote, StaticCache};

    /// Action with a fixed test answer that logs each call.
    struct Scripted {
        name: &'static str,
        passes: bool,
        fail_on: Option<Branch>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Scripted {
        fn boxed(
            name: &'static str,
            passes: bool,
            log: &Rc<RefCell<Vec<String>>>,
        ) -> Box<dyn Action> {
            Box::new(Self {
                name,
                passes,
                fail_on: None,
                log: Rc::clone(log),
            })
        }

        fn call(&self, what: &str, branch: Option<Branch>) -> Result<()> {
            self.log.borrow_mut().push(format!("{}.{what}", self.name));
            if branch.is_some() && branch == self.fail_on {
                return Err(anyhow!("{} broke", self.name));
            }
            Ok(())
        }
    }

    impl Action for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn test(&self, _session: &mut Session<'_>) -> Result<bool> {
            self.call("test", None)?;
            Ok(self.passes)
        }

        fn run(&self, _session: &mut Session<'_>) -> Result<()> {
            self.call("run", Some(Branch::Run))
        }

        fn fail(&self, _session: &mut Session<'_>) -> Result<()> {
            self.call("fail", Some(Branch::Fail))
        }
    }

    #[test]
    fn dispatches_run_or_fail_by_test() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let actions = vec![
            Scripted::boxed("a", true, &log),
            Scripted::boxed("b", false, &log),
        ];
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let mut session = Session::new(&remote, &cache, &mut ctx);

        let report = run_sequence(&actions, &mut session).expect("sequence");

        assert_eq!(
            *log.borrow(),
            vec!["a.test", "a.run", "b.test", "b.fail"]
        );
        assert_eq!(report.branch_of("a"), Some(Branch::Run));
        assert_eq!(report.branch_of("b"), Some(Branch::Fail));
        assert_eq!(report.failed(), vec!["b"]);
    }

    #[test]
    fn error_aborts_remaining_actions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let actions: Vec<Box<dyn Action>> = vec![
            Scripted::boxed("a", true, &log),
            Box::new(Scripted {
                name: "b",
                passes: false,
                fail_on: Some(Branch::Fail),
                log: Rc::clone(&log),
            }),
            Scripted::boxed("c", true, &log),
        ];
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let mut session = Session::new(&remote, &cache, &mut ctx);

        let err = run_sequence(&actions, &mut session).unwrap_err();

        assert_eq!(err.to_string(), "action b (fail)");
        assert_eq!(format!("{err:#}"), "action b (fail): b broke");
        assert!(!log.borrow().iter().any(|entry| entry.starts_with("c.")));
    }

    #[test]
    fn duplicate_names_rejected_before_dispatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let actions = vec![
            Scripted::boxed("redis", true, &log),
            Scripted::boxed("redis", false, &log),
        ];
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let mut session = Session::new(&remote, &cache, &mut ctx);

        let err = run_sequence(&actions, &mut session).unwrap_err();
        assert!(err.to_string().contains("duplicate action name: redis"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn empty_sequence_is_empty_report() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let mut session = Session::new(&remote, &cache, &mut ctx);

        let report = run_sequence(&[], &mut session).expect("sequence");
        assert!(report.records.is_empty());
    }
}
