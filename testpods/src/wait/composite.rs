use super::{Probe, Result, TimeoutSnafu, WaitStrategy, WaitTarget};
use crate::error::{self, EmptySnafu};
use async_trait::async_trait;
use futures::future::try_join_all;
use snafu::ensure;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a composite combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Ready only once every child has independently reported ready. Children run concurrently,
    /// each polling at its own cadence within its own timeout; the composite returns on the
    /// first failure or once the slowest child resolves.
    AllOf,
    /// Ready as soon as any child is. Children are probed once per tick in declaration order,
    /// so when several become ready in the same tick the first declared wins deterministically.
    AnyOf,
}

/// Combines child strategies under an explicit combinator. A composite is itself a
/// [`WaitStrategy`], so composites nest arbitrarily.
pub struct CompositeWaitStrategy {
    children: Vec<Box<dyn WaitStrategy>>,
    combinator: Combinator,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for CompositeWaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeWaitStrategy")
            .field("children", &self.children.len())
            .field("combinator", &self.combinator)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl CompositeWaitStrategy {
    /// An all-must-pass composite. At least one child is required.
    pub fn all_of(children: Vec<Box<dyn WaitStrategy>>) -> error::Result<Self> {
        Self::new(children, Combinator::AllOf)
    }

    /// A first-to-pass composite. At least one child is required.
    pub fn any_of(children: Vec<Box<dyn WaitStrategy>>) -> error::Result<Self> {
        Self::new(children, Combinator::AnyOf)
    }

    fn new(children: Vec<Box<dyn WaitStrategy>>, combinator: Combinator) -> error::Result<Self> {
        ensure!(
            !children.is_empty(),
            EmptySnafu {
                item: "child strategy",
                what: "composite wait strategy",
            }
        );
        Ok(Self {
            children,
            combinator,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// The overall budget. For `AllOf` this bounds the slowest child from the outside; for
    /// `AnyOf` it bounds the shared tick loop.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The tick interval of the `AnyOf` loop. `AllOf` children keep their own cadences.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    async fn wait_all(&self, target: &WaitTarget) -> Result<()> {
        let start = Instant::now();
        let all = try_join_all(
            self.children
                .iter()
                .map(|child| child.wait_until_ready(target)),
        );
        match tokio::time::timeout(self.timeout, all).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => TimeoutSnafu {
                what: target.name().to_string(),
                strategy: self.describe(),
                elapsed: start.elapsed(),
                timeout: self.timeout,
                last: Some("not all child strategies resolved".to_string()),
            }
            .fail(),
        }
    }

    async fn wait_any(&self, target: &WaitTarget) -> Result<()> {
        let start = Instant::now();
        let mut last = None;
        loop {
            for child in &self.children {
                match child.probe(target).await? {
                    Probe::Ready => return Ok(()),
                    Probe::Pending(reason) => last = Some(reason),
                }
            }
            if start.elapsed() >= self.timeout {
                break;
            }
            sleep(self.poll_interval).await;
            if start.elapsed() >= self.timeout {
                break;
            }
        }
        TimeoutSnafu {
            what: target.name().to_string(),
            strategy: self.describe(),
            elapsed: start.elapsed(),
            timeout: self.timeout,
            last,
        }
        .fail()
    }
}

#[async_trait]
impl WaitStrategy for CompositeWaitStrategy {
    /// A single tick over the children: `AllOf` is ready when every child is ready right now,
    /// `AnyOf` when any is. Used when this composite is nested inside another.
    async fn probe(&self, target: &WaitTarget) -> Result<Probe> {
        match self.combinator {
            Combinator::AllOf => {
                for child in &self.children {
                    match child.probe(target).await? {
                        Probe::Ready => {}
                        pending => return Ok(pending),
                    }
                }
                Ok(Probe::Ready)
            }
            Combinator::AnyOf => {
                let mut last = None;
                for child in &self.children {
                    match child.probe(target).await? {
                        Probe::Ready => return Ok(Probe::Ready),
                        Probe::Pending(reason) => last = Some(reason),
                    }
                }
                Ok(Probe::Pending(
                    last.unwrap_or_else(|| "no child strategy is ready".to_string()),
                ))
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn describe(&self) -> String {
        let children: Vec<String> = self.children.iter().map(|c| c.describe()).collect();
        match self.combinator {
            Combinator::AllOf => format!("all-of[{}]", children.join(", ")),
            Combinator::AnyOf => format!("any-of[{}]", children.join(", ")),
        }
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> Result<()> {
        if self.timeout.is_zero() || self.poll_interval.is_zero() {
            return super::InvalidBudgetSnafu {
                strategy: self.describe(),
            }
            .fail();
        }
        match self.combinator {
            Combinator::AllOf => self.wait_all(target).await,
            Combinator::AnyOf => self.wait_any(target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        succeed_after: usize,
        attempts: Arc<AtomicUsize>,
        timeout: Duration,
        poll_interval: Duration,
    }

    impl Scripted {
        fn ready_after(succeed_after: usize) -> Self {
            Self {
                succeed_after,
                attempts: Arc::new(AtomicUsize::new(0)),
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
            }
        }

        fn never() -> Self {
            Self::ready_after(usize::MAX)
        }

        fn attempts(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.attempts)
        }
    }

    #[async_trait]
    impl WaitStrategy for Scripted {
        async fn probe(&self, _target: &WaitTarget) -> Result<Probe> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.succeed_after {
                Ok(Probe::Ready)
            } else {
                Ok(Probe::Pending(format!("attempt {}", attempt)))
            }
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn poll_interval(&self) -> Duration {
            self.poll_interval
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn target() -> WaitTarget {
        WaitTarget::new("composite", "unit")
    }

    #[test]
    fn empty_composite_is_rejected_at_build_time() {
        let err = CompositeWaitStrategy::all_of(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("child strategy"));
    }

    #[tokio::test]
    async fn all_of_succeeds_no_earlier_than_the_slowest_child() {
        let instant = Scripted::ready_after(1);
        let slow = Scripted::ready_after(5);
        let slow_attempts = slow.attempts();
        let composite =
            CompositeWaitStrategy::all_of(vec![Box::new(instant), Box::new(slow)]).unwrap();
        composite.wait_until_ready(&target()).await.unwrap();
        // The composite cannot have resolved before the slow child's fifth attempt.
        assert_eq!(slow_attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn all_of_fails_when_a_child_times_out() {
        let mut never = Scripted::never();
        never.timeout = Duration::from_millis(100);
        never.poll_interval = Duration::from_millis(20);
        let composite =
            CompositeWaitStrategy::all_of(vec![Box::new(Scripted::ready_after(1)), Box::new(never)])
                .unwrap();
        let err = composite.wait_until_ready(&target()).await.unwrap_err();
        assert!(matches!(err, super::super::Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn all_of_outer_budget_bounds_the_slowest_child() {
        let mut glacial = Scripted::never();
        glacial.timeout = Duration::from_secs(3600);
        glacial.poll_interval = Duration::from_millis(20);
        let composite = CompositeWaitStrategy::all_of(vec![Box::new(glacial)])
            .unwrap()
            .with_timeout(Duration::from_millis(120));
        let start = Instant::now();
        let err = composite.wait_until_ready(&target()).await.unwrap_err();
        assert!(matches!(err, super::super::Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn any_of_succeeds_as_soon_as_one_child_is_ready() {
        let pending = Scripted::ready_after(100);
        let pending_attempts = pending.attempts();
        let ready = Scripted::ready_after(1);
        let composite = CompositeWaitStrategy::any_of(vec![Box::new(pending), Box::new(ready)])
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        composite.wait_until_ready(&target()).await.unwrap();
        // One tick: the pending child was probed once, then the ready child won.
        assert_eq!(pending_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn any_of_ties_break_in_declaration_order() {
        let first = Scripted::ready_after(1);
        let second = Scripted::ready_after(1);
        let second_attempts = second.attempts();
        let composite =
            CompositeWaitStrategy::any_of(vec![Box::new(first), Box::new(second)]).unwrap();
        composite.wait_until_ready(&target()).await.unwrap();
        // Both were ready in the same tick; the first declared won and the second was never
        // probed.
        assert_eq!(second_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn any_of_times_out_when_no_child_becomes_ready() {
        let composite = CompositeWaitStrategy::any_of(vec![
            Box::new(Scripted::never()),
            Box::new(Scripted::never()),
        ])
        .unwrap()
        .with_timeout(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(20));
        let err = composite.wait_until_ready(&target()).await.unwrap_err();
        assert!(matches!(err, super::super::Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn composites_nest() {
        let inner = CompositeWaitStrategy::any_of(vec![
            Box::new(Scripted::never()),
            Box::new(Scripted::ready_after(1)),
        ])
        .unwrap();
        let outer =
            CompositeWaitStrategy::all_of(vec![Box::new(inner), Box::new(Scripted::ready_after(2))])
                .unwrap();
        outer.wait_until_ready(&target()).await.unwrap();
    }
}
