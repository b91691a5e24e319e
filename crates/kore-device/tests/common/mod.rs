//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kore_device::runtime::SimRuntime;
use kore_device::{GpuContext, GpuRuntime};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Counts WARN events whose target starts with `target`.
struct WarnCounter {
    target: &'static str,
    hits: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target().starts_with(self.target) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with a thread-local subscriber and return how many WARN events
/// with a target under `target` it emitted.
pub fn count_warnings<R>(target: &'static str, f: impl FnOnce() -> R) -> (R, usize) {
    let hits = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter {
        target,
        hits: Arc::clone(&hits),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, hits.load(Ordering::SeqCst))
}

/// A context over a simulated runtime, keeping a handle to the runtime for stats.
pub fn sim_ctx(rt: SimRuntime) -> (Arc<SimRuntime>, GpuContext) {
    let rt = Arc::new(rt);
    let ctx = GpuContext::new(Arc::clone(&rt) as Arc<dyn GpuRuntime>);
    (rt, ctx)
}
