// tests/annotation_client.rs
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feed_digest::annotate::providers::Provider;
use feed_digest::annotate::{AnnotateError, AnnotationClient, Annotator, RetryPolicy};

type Script = dyn Fn(usize) -> Result<String, AnnotateError> + Send + Sync;

/// Provider whose n-th call (0-based) is answered by `script(n)`.
struct Scripted {
    name: &'static str,
    calls: AtomicUsize,
    script: Box<Script>,
}

impl Scripted {
    fn new(
        name: &'static str,
        script: impl Fn(usize) -> Result<String, AnnotateError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for Scripted {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnnotateError>> + Send + 'a>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let out = (self.script)(n);
        Box::pin(async move { out })
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        delays: vec![Duration::from_millis(1); 3],
    }
}

fn server_error() -> AnnotateError {
    AnnotateError::Status {
        provider: "primary",
        status: 500,
        body: "boom".into(),
    }
}

fn rate_limited() -> AnnotateError {
    AnnotateError::RateLimited { retry_after: None }
}

#[tokio::test]
async fn failover_sticks_for_the_rest_of_the_run() {
    let primary = Scripted::new("primary", |_| Err(server_error()));
    let secondary = Scripted::new("secondary", |n| Ok(format!("s{n}")));
    let client = AnnotationClient::new(Some(primary.clone()), Some(secondary.clone()))
        .unwrap()
        .with_retry_policy(fast_retry());

    assert!(client.is_using_primary());
    assert_eq!(client.call("a").await.unwrap(), "s0");
    assert!(!client.is_using_primary());
    assert_eq!(client.active_provider(), "secondary");

    for _ in 0..4 {
        client.call("b").await.unwrap();
    }
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 5);
}

#[tokio::test]
async fn two_rate_limits_then_success_takes_three_attempts_without_switching() {
    let primary = Scripted::new("primary", |n| {
        if n < 2 {
            Err(rate_limited())
        } else {
            Ok("ok".into())
        }
    });
    let secondary = Scripted::new("secondary", |_| Ok("fallback".into()));
    let client = AnnotationClient::new(Some(primary.clone()), Some(secondary.clone()))
        .unwrap()
        .with_retry_policy(fast_retry());

    assert_eq!(client.call("p").await.unwrap(), "ok");
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 0);
    assert!(client.is_using_primary());
}

#[tokio::test]
async fn exhausted_rate_limit_without_fallback_is_reported() {
    let primary = Scripted::new("primary", |_| Err(rate_limited()));
    let client = AnnotationClient::new(Some(primary.clone()), None)
        .unwrap()
        .with_retry_policy(fast_retry());

    let err = client.call("p").await.unwrap_err();
    assert!(matches!(err, AnnotateError::RateLimitExhausted { attempts: 4 }));
    assert_eq!(primary.calls(), 4);
    // no fallback to switch to: the primary stays selected
    assert!(client.is_using_primary());
}

#[tokio::test]
async fn exhausted_rate_limit_with_fallback_switches() {
    let primary = Scripted::new("primary", |_| Err(rate_limited()));
    let secondary = Scripted::new("secondary", |_| Ok("fallback".into()));
    let client = AnnotationClient::new(Some(primary.clone()), Some(secondary.clone()))
        .unwrap()
        .with_retry_policy(fast_retry());

    assert_eq!(client.call("p").await.unwrap(), "fallback");
    assert_eq!(primary.calls(), 4);
    assert!(!client.is_using_primary());
}

#[tokio::test]
async fn non_rate_limit_errors_are_not_retried() {
    let primary = Scripted::new("primary", |_| Err(server_error()));
    let client = AnnotationClient::new(Some(primary.clone()), None)
        .unwrap()
        .with_retry_policy(fast_retry());

    let err = client.call("p").await.unwrap_err();
    assert!(matches!(err, AnnotateError::Status { status: 500, .. }));
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn concurrent_failures_switch_once() {
    let primary = Scripted::new("primary", |_| Err(server_error()));
    let secondary = Scripted::new("secondary", |_| Ok("fallback".into()));
    let client = AnnotationClient::new(Some(primary.clone()), Some(secondary.clone()))
        .unwrap()
        .with_retry_policy(fast_retry());

    let results = futures::future::join_all((0..6).map(|_| client.call("p"))).await;
    assert!(results.iter().all(|r| matches!(r.as_deref(), Ok("fallback"))));
    assert_eq!(secondary.calls(), 6);
    assert!(primary.calls() >= 1 && primary.calls() <= 6);
    assert!(!client.is_using_primary());

    client.call("later").await.unwrap();
    assert!(primary.calls() <= 6);
    assert_eq!(secondary.calls(), 7);
}

#[tokio::test(start_paused = true)]
async fn provider_retry_hint_overrides_the_delay_table() {
    let primary = Scripted::new("primary", |n| {
        if n == 0 {
            Err(AnnotateError::RateLimited {
                retry_after: Some(Duration::from_millis(10)),
            })
        } else {
            Ok("done".into())
        }
    });
    let client = AnnotationClient::new(Some(primary.clone()), None)
        .unwrap()
        .with_retry_policy(RetryPolicy {
            delays: vec![Duration::from_secs(3600); 3],
        });

    let started = tokio::time::Instant::now();
    assert_eq!(client.call("p").await.unwrap(), "done");
    let waited = started.elapsed();
    assert_eq!(primary.calls(), 2);
    assert!(waited >= Duration::from_millis(10));
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");
}

#[tokio::test]
async fn empty_answer_is_not_a_failover_trigger() {
    let primary = Scripted::new("primary", |_| Ok(String::new()));
    let secondary = Scripted::new("secondary", |_| Ok("fallback".into()));
    let client = AnnotationClient::new(Some(primary.clone()), Some(secondary.clone()))
        .unwrap()
        .with_retry_policy(fast_retry());

    assert_eq!(client.call("p").await.unwrap(), "");
    assert!(client.is_using_primary());
    assert_eq!(secondary.calls(), 0);
}
