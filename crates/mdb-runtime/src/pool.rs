//! # Instance Pool
//!
//! Each deployment owns one [`InstancePool`]. It bounds the number of live bean
//! instances and separates the three ways an instance can leave a delivery:
//!
//! | Path | Method | Lifecycle callback | Counted as live afterwards |
//! |------|--------|--------------------|----------------------------|
//! | Pool | [`InstancePool::pool_instance`] | none | yes |
//! | Discard | [`InstancePool::discard_instance`] | none | no |
//! | Free | [`InstancePool::free_instance`] | `pre_destroy` | no |
//!
//! Acquisition never waits. When the limit is reached [`InstancePool::create_instance`]
//! fails fast with [`MdbError::Unavailable`] and the resource adapter backs off.
//!
//! The live count is reserved before construction starts and released again if
//! construction fails or is cancelled, so failed attempts never leave phantom
//! reservations behind.
//!
//! ## Sizing and retirement
//!
//! Three bean properties shape a pool:
//!
//! | Property | Effect |
//! |----------|--------|
//! | `PoolMin` | instances created at deploy time and kept through idle eviction |
//! | `MaxAge` | milliseconds after which an instance is retired instead of reused |
//! | `MaxAgeOffset` | staggers the ages of the `PoolMin` instances so they do not all retire at once |
//!
//! A pool is closed when its deployment is undeployed. Instances handed back after
//! that point, and instances past `MaxAge`, are freed with `pre_destroy` instead of
//! going back on the idle list.

use crate::bean::{Interceptor, Invocation, MessageDrivenBean};
use crate::context::MessageDrivenContext;
use crate::deployment::{BeanDeployment, DeploymentId};
use crate::error::MdbError;
use crate::exception::BeanException;
use crate::injection::InjectionSource;
use crate::listener::{MessageListener, Method};
use crate::lock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A constructed bean together with its interceptor instances.
pub struct Instance<L: MessageListener> {
    id: InstanceId,
    created: Instant,
    bean: Box<dyn MessageDrivenBean<L>>,
    interceptors: HashMap<String, Arc<dyn Interceptor<L>>>,
    order: Vec<String>,
}

impl<L: MessageListener> Instance<L> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    fn chain(&self, class_names: &[&str]) -> Vec<Arc<dyn Interceptor<L>>> {
        class_names
            .iter()
            .filter_map(|name| self.interceptors.get(*name).cloned())
            .collect()
    }

    /// Runs `method` through the interceptors named in `class_names`, then the bean.
    pub(crate) async fn invoke(
        &mut self,
        class_names: &[&str],
        method: &Method,
        message: L::Message,
        ctx: &MessageDrivenContext,
    ) -> Result<L::Reply, BeanException> {
        let chain = self.chain(class_names);
        Invocation::new(&chain, self.bean.as_mut(), method, ctx)
            .proceed(message)
            .await
    }

    async fn destroy(&mut self) {
        for name in &self.order {
            if let Some(interceptor) = self.interceptors.get(name) {
                if let Err(e) = interceptor.pre_destroy().await {
                    warn!(instance_id = %self.id, interceptor = %name, error = %e, "interceptor pre-destroy failed");
                }
            }
        }
        if let Err(e) = self.bean.pre_destroy().await {
            warn!(instance_id = %self.id, error = %e, "pre-destroy failed");
        }
    }
}

impl<L: MessageListener> fmt::Debug for Instance<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("interceptors", &self.order)
            .finish_non_exhaustive()
    }
}

struct Idle<L: MessageListener> {
    instance: Instance<L>,
    since: Instant,
}

/// Snapshot of a pool for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStats {
    pub deployment_id: String,
    pub live: usize,
    pub idle: usize,
    pub limit: Option<usize>,
    pub min: usize,
}

pub struct InstancePool<L: MessageListener> {
    deployment: Arc<BeanDeployment<L>>,
    injection_source: Option<Arc<dyn InjectionSource>>,
    limit: Option<usize>,
    min: usize,
    max_age: Option<Duration>,
    max_age_offset: f64,
    live: Mutex<usize>,
    idle: Mutex<Vec<Idle<L>>>,
    /// Set under the `idle` lock so nothing is pooled after `close` drains the list.
    closed: AtomicBool,
}

impl<L: MessageListener> InstancePool<L> {
    /// `limit` of `None` means unbounded. `PoolMin`, `MaxAge` and `MaxAgeOffset` are read
    /// from the deployment's bean properties; `PoolMin` never exceeds `limit`.
    pub fn new(
        deployment: Arc<BeanDeployment<L>>,
        injection_source: Option<Arc<dyn InjectionSource>>,
        limit: Option<usize>,
    ) -> Self {
        let min = deployment.pool_min();
        Self {
            min: limit.map_or(min, |limit| min.min(limit)),
            max_age: deployment.max_age(),
            max_age_offset: deployment.max_age_offset(),
            deployment,
            injection_source,
            limit,
            live: Mutex::new(0),
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        self.deployment.id()
    }

    /// Hands out the most recently pooled instance, or constructs a new one. Pooled
    /// instances past their max age are freed on the way.
    pub async fn acquire(&self) -> Result<Instance<L>, MdbError> {
        loop {
            let pooled = lock(&self.idle).pop();
            let Some(idle) = pooled else {
                return self.create_instance().await;
            };
            if self.is_aged(&idle.instance, Instant::now()) {
                debug!(deployment_id = %self.deployment_id(), instance_id = %idle.instance.id, "retiring aged instance");
                self.free_instance(idle.instance).await;
                continue;
            }
            debug!(deployment_id = %self.deployment_id(), instance_id = %idle.instance.id, "reusing pooled instance");
            return Ok(idle.instance);
        }
    }

    pub async fn create_instance(&self) -> Result<Instance<L>, MdbError> {
        let reservation = self.reserve(true)?;
        self.build(reservation).await
    }

    /// Constructs an instance outside the instance limit. It still counts as live until
    /// it is freed or discarded.
    pub async fn create_unbounded_instance(&self) -> Result<Instance<L>, MdbError> {
        let reservation = self.reserve(false)?;
        self.build(reservation).await
    }

    async fn build(&self, reservation: Reservation<'_>) -> Result<Instance<L>, MdbError> {
        let instance = self.construct().await.map_err(|e| {
            error!(
                deployment_id = %self.deployment_id(),
                error = %e,
                root_cause = %e.root_cause(),
                "bean construction failed"
            );
            MdbError::unavailable(
                format!("Unable to construct an instance of {}", self.deployment_id()),
                Some(Box::new(e)),
            )
        })?;
        reservation.keep();
        debug!(deployment_id = %self.deployment_id(), instance_id = %instance.id, "instance created");
        Ok(instance)
    }

    fn reserve(&self, bounded: bool) -> Result<Reservation<'_>, MdbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MdbError::unavailable(
                format!("{} has been undeployed", self.deployment_id()),
                None,
            ));
        }
        let mut live = lock(&self.live);
        if let Some(limit) = self.limit.filter(|_| bounded) {
            if *live >= limit {
                return Err(MdbError::unavailable(
                    format!("Instance limit of {limit} reached for {}", self.deployment_id()),
                    None,
                ));
            }
        }
        *live += 1;
        Ok(Reservation {
            live: &self.live,
            armed: true,
        })
    }

    async fn construct(&self) -> Result<Instance<L>, BeanException> {
        let id = InstanceId::next();
        let mut bean = self.deployment.create_bean()?;
        self.inject(id, bean.as_mut());

        let mut interceptors = HashMap::new();
        let mut order = Vec::new();
        for definition in self.deployment.interceptors() {
            let interceptor = definition.construct()?;
            interceptors.insert(definition.class_name().to_string(), interceptor);
            order.push(definition.class_name().to_string());
        }
        for name in &order {
            if let Some(interceptor) = interceptors.get(name) {
                interceptor.post_construct().await?;
            }
        }
        bean.post_construct().await?;
        bean.ejb_create().await?;

        Ok(Instance {
            id,
            created: Instant::now(),
            bean,
            interceptors,
            order,
        })
    }

    /// Injection failures are tolerated: optional resources may be absent.
    fn inject(&self, id: InstanceId, bean: &mut dyn MessageDrivenBean<L>) {
        for injection in self.deployment.injections() {
            let Some(source) = &self.injection_source else {
                warn!(instance_id = %id, name = %injection.name, "no injection source configured");
                continue;
            };
            let result = source
                .lookup(&injection.name)
                .map_err(|e| e.to_string())
                .and_then(|value| bean.inject(&injection.target, value).map_err(|e| e.to_string()));
            if let Err(e) = result {
                warn!(
                    deployment_id = %self.deployment_id(),
                    instance_id = %id,
                    name = %injection.name,
                    target = %injection.target,
                    error = %e,
                    "injection failed"
                );
            }
        }
    }

    /// Returns a healthy instance for reuse.
    ///
    /// A closed pool, or an instance past its max age, gets the instance freed instead.
    /// Callers are synchronous delivery callbacks, so `pre_destroy` then runs on a
    /// spawned task.
    pub fn pool_instance(self: &Arc<Self>, instance: Instance<L>) {
        let instance = {
            let mut idle = lock(&self.idle);
            let now = Instant::now();
            if !self.closed.load(Ordering::SeqCst) && !self.is_aged(&instance, now) {
                debug!(deployment_id = %self.deployment_id(), instance_id = %instance.id, "instance pooled");
                idle.push(Idle { instance, since: now });
                return;
            }
            instance
        };
        self.retire(instance);
    }

    fn retire(self: &Arc<Self>, instance: Instance<L>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(deployment_id = %self.deployment_id(), instance_id = %instance.id, "retiring instance");
                let pool = Arc::clone(self);
                runtime.spawn(async move {
                    pool.free_instance(instance).await;
                });
            }
            Err(_) => {
                warn!(
                    deployment_id = %self.deployment_id(),
                    instance_id = %instance.id,
                    "no runtime to run pre-destroy, discarding instance"
                );
                self.discard_instance(instance);
            }
        }
    }

    fn is_aged(&self, instance: &Instance<L>, now: Instant) -> bool {
        self.max_age
            .is_some_and(|max_age| now.saturating_duration_since(instance.created) > max_age)
    }

    /// Creates the `PoolMin` instances. A failed construction is logged and stops the
    /// fill, leaving the pool short. Returns how many were created.
    pub async fn fill(self: &Arc<Self>) -> usize {
        let mut filled = 0;
        for iteration in 0..self.min {
            match self.create_instance().await {
                Ok(mut instance) => {
                    instance.created += self.age_offset(iteration);
                    self.pool_instance(instance);
                    filled += 1;
                }
                Err(e) => {
                    warn!(deployment_id = %self.deployment_id(), error = %e, "unable to fill instance pool");
                    break;
                }
            }
        }
        filled
    }

    /// How far the creation time of the `iteration`-th `PoolMin` instance is pushed
    /// forward. Zero unless both `MaxAge` and a positive `MaxAgeOffset` are set.
    fn age_offset(&self, iteration: usize) -> Duration {
        let Some(max_age) = self.max_age else {
            return Duration::ZERO;
        };
        if self.max_age_offset <= 0.0 {
            return Duration::ZERO;
        }
        let max_age_ms = max_age.as_millis() as f64;
        let offset_ms = (max_age_ms / self.max_age_offset * self.min as f64 * iteration as f64) % max_age_ms;
        Duration::from_millis(offset_ms as u64)
    }

    async fn replenish(self: &Arc<Self>) {
        while self.instance_count() < self.min {
            match self.create_instance().await {
                Ok(instance) => self.pool_instance(instance),
                Err(e) => {
                    debug!(deployment_id = %self.deployment_id(), error = %e, "unable to replenish instance pool");
                    break;
                }
            }
        }
    }

    /// Drops a suspect instance without any lifecycle callback.
    pub fn discard_instance(&self, instance: Instance<L>) {
        debug!(deployment_id = %self.deployment_id(), instance_id = %instance.id, "instance discarded");
        drop(instance);
        self.release_count();
    }

    /// Destroys an instance, running its pre-destroy callbacks.
    pub async fn free_instance(&self, mut instance: Instance<L>) {
        instance.destroy().await;
        debug!(deployment_id = %self.deployment_id(), instance_id = %instance.id, "instance freed");
        drop(instance);
        self.release_count();
    }

    fn release_count(&self) {
        let mut live = lock(&self.live);
        *live = live.saturating_sub(1);
    }

    /// Frees pooled instances past their max age, and instances idle for at least
    /// `idle_timeout` as long as the pool stays at `PoolMin`. Then tops the pool back up
    /// to `PoolMin`. Returns how many were freed.
    pub async fn evict_idle(self: &Arc<Self>, idle_timeout: Option<Duration>) -> usize {
        let now = Instant::now();
        let expired: Vec<Idle<L>> = {
            let mut idle = lock(&self.idle);
            let (mut expired, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut *idle)
                .into_iter()
                .partition(|i| self.is_aged(&i.instance, now));
            let mut spare = self.instance_count().saturating_sub(self.min + expired.len());
            for entry in fresh {
                let timed_out = idle_timeout.is_some_and(|timeout| now.duration_since(entry.since) >= timeout);
                if timed_out && spare > 0 {
                    spare -= 1;
                    expired.push(entry);
                } else {
                    idle.push(entry);
                }
            }
            expired
        };
        let count = expired.len();
        for idle in expired {
            self.free_instance(idle.instance).await;
        }
        self.replenish().await;
        count
    }

    /// Closes the pool and frees every pooled instance. Later acquisitions fail and
    /// instances handed back afterwards are freed.
    pub async fn close(&self) -> usize {
        let drained = {
            let mut idle = lock(&self.idle);
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *idle)
        };
        let count = drained.len();
        for idle in drained {
            self.free_instance(idle.instance).await;
        }
        count
    }

    pub fn instance_count(&self) -> usize {
        *lock(&self.live)
    }

    pub fn instance_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }

    pub fn stats(&self) -> InstanceStats {
        InstanceStats {
            deployment_id: self.deployment_id().to_string(),
            live: self.instance_count(),
            idle: self.idle_count(),
            limit: self.limit,
            min: self.min,
        }
    }
}

/// A live-count slot held while an instance is being constructed.
struct Reservation<'a> {
    live: &'a Mutex<usize>,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut live = lock(self.live);
            *live = live.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::BeanDeploymentBuilder;
    use crate::injection::Bindings;
    use crate::mock::{BeanRecorder, MockListener, RecordingInterceptor};

    fn builder(recorder: &BeanRecorder) -> BeanDeploymentBuilder<MockListener> {
        BeanDeployment::builder("AuditBean", "AuditBean", recorder.factory())
    }

    fn pool(recorder: &BeanRecorder, limit: Option<usize>) -> Arc<InstancePool<MockListener>> {
        Arc::new(InstancePool::new(Arc::new(builder(recorder).build()), None, limit))
    }

    /// Lets spawned retirement tasks run.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_then_discard_or_free_restores_count() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, None);

        let mut instances = Vec::new();
        for _ in 0..4 {
            instances.push(pool.create_instance().await.unwrap());
        }
        assert_eq!(pool.instance_count(), 4);

        let freed = instances.split_off(2);
        for instance in instances {
            pool.discard_instance(instance);
        }
        for instance in freed {
            pool.free_instance(instance).await;
        }

        assert_eq!(pool.instance_count(), 0);
        assert_eq!(recorder.destroyed(), 2);
    }

    #[tokio::test]
    async fn test_limit_fails_fast_and_failed_construction_releases_slot() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, Some(1));

        let first = pool.create_instance().await.unwrap();
        assert!(matches!(pool.create_instance().await, Err(MdbError::Unavailable { .. })));

        pool.discard_instance(first);
        recorder.fail_construction(true);
        let err = pool.create_instance().await.unwrap_err();
        assert!(matches!(err, MdbError::Unavailable { .. }));
        assert!(err.bean_exception().is_some());
        assert_eq!(pool.instance_count(), 0);

        recorder.fail_construction(false);
        assert!(pool.create_instance().await.is_ok());
    }

    #[tokio::test]
    async fn test_unbounded_instance_ignores_limit_but_is_counted() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, Some(1));

        let held = pool.create_instance().await.unwrap();
        let extra = pool.create_unbounded_instance().await.unwrap();
        assert_eq!(pool.instance_count(), 2);

        pool.free_instance(extra).await;
        pool.free_instance(held).await;
        assert_eq!(pool.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_reuses_last_pooled_instance() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, None);

        let instance = pool.acquire().await.unwrap();
        let id = instance.id();
        pool.pool_instance(instance);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire().await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(recorder.created(), 1);
        assert_eq!(pool.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_construction_runs_callbacks_in_order_and_tolerates_failed_injection() {
        let recorder = BeanRecorder::default();
        let log = Default::default();
        let deployment = builder(&recorder)
            .inject("java:comp/env/auditTopic", "topic")
            .inject("java:comp/env/missing", "optional")
            .interceptor("Trail", RecordingInterceptor::factory("Trail", &log))
            .build();
        let bindings = Bindings::new().bind("java:comp/env/auditTopic", String::from("audit"));
        let pool = InstancePool::new(Arc::new(deployment), Some(Arc::new(bindings)), None);

        let instance = pool.create_instance().await.unwrap();

        assert_eq!(recorder.injected(), vec!["topic".to_string()]);
        assert_eq!(recorder.lifecycle(), vec!["post_construct", "ejb_create"]);
        assert_eq!(log.lock().unwrap().clone(), vec!["Trail:post_construct".to_string()]);

        pool.free_instance(instance).await;
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("Trail:pre_destroy"));
        assert_eq!(recorder.lifecycle().last().copied(), Some("pre_destroy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_frees_only_expired_instances() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, None);

        let old = pool.create_instance().await.unwrap();
        pool.pool_instance(old);
        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = pool.create_instance().await.unwrap();
        pool.pool_instance(fresh);

        assert_eq!(pool.evict_idle(Some(Duration::from_secs(20))).await, 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.instance_count(), 1);
        assert_eq!(recorder.destroyed(), 1);

        assert_eq!(pool.close().await, 1);
        assert_eq!(pool.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_instance_returned_after_close_is_destroyed() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, None);
        let checked_out = pool.acquire().await.unwrap();

        assert_eq!(pool.close().await, 0);
        pool.pool_instance(checked_out);
        settle().await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.instance_count(), 0);
        assert_eq!(recorder.destroyed(), 1);
        assert!(matches!(pool.acquire().await, Err(MdbError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_pool_instance_without_runtime_discards() {
        let recorder = BeanRecorder::default();
        let pool = pool(&recorder, None);
        let instance = pool.create_instance().await.unwrap();
        pool.close().await;

        let returned = pool.clone();
        std::thread::spawn(move || returned.pool_instance(instance))
            .join()
            .unwrap();

        assert_eq!(pool.instance_count(), 0);
        assert_eq!(recorder.destroyed(), 0);
    }

    #[tokio::test]
    async fn test_fill_creates_pool_min_within_limit() {
        let recorder = BeanRecorder::default();
        let deployment = builder(&recorder).property("PoolMin", "5").build();
        let pool = Arc::new(InstancePool::new(Arc::new(deployment), None, Some(3)));

        assert_eq!(pool.fill().await, 3);
        let stats = pool.stats();
        assert_eq!((stats.live, stats.idle, stats.min), (3, 3, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_eviction_keeps_pool_min() {
        let recorder = BeanRecorder::default();
        let deployment = builder(&recorder).property("PoolMin", "1").build();
        let pool = Arc::new(InstancePool::new(Arc::new(deployment), None, None));
        pool.fill().await;
        let extra = pool.create_instance().await.unwrap();
        pool.pool_instance(extra);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(pool.evict_idle(Some(Duration::from_secs(10))).await, 1);
        assert_eq!(pool.instance_count(), 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(recorder.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aged_instances_are_retired_on_return_and_acquire() {
        let recorder = BeanRecorder::default();
        let deployment = builder(&recorder).property("MaxAge", "1000").build();
        let pool = pool_with(deployment);

        let first = pool.acquire().await.unwrap();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        pool.pool_instance(first);
        settle().await;
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(recorder.destroyed(), 1);

        let second = pool.acquire().await.unwrap();
        pool.pool_instance(second);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        let third = pool.acquire().await.unwrap();
        assert_eq!(recorder.created(), 3);
        assert_eq!(recorder.destroyed(), 2);
        assert_eq!(pool.instance_count(), 1);
        pool.free_instance(third).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_age_offset_staggers_pool_min_retirement() {
        let recorder = BeanRecorder::default();
        let deployment = builder(&recorder)
            .property("PoolMin", "2")
            .property("MaxAge", "3000")
            .property("MaxAgeOffset", "3")
            .build();
        let pool = pool_with(deployment);
        assert_eq!(pool.fill().await, 2);

        // Offsets are 0 ms and 2000 ms, so the second instance ages out 2 s later.
        tokio::time::advance(Duration::from_millis(3_500)).await;
        assert_eq!(pool.evict_idle(None).await, 1);
        assert_eq!(pool.instance_count(), 2);
        assert_eq!(recorder.created(), 3);

        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert_eq!(pool.evict_idle(None).await, 1);
        assert_eq!(pool.instance_count(), 2);
        assert_eq!(recorder.created(), 4);
        assert_eq!(recorder.destroyed(), 2);
    }

    fn pool_with(deployment: BeanDeployment<MockListener>) -> Arc<InstancePool<MockListener>> {
        Arc::new(InstancePool::new(Arc::new(deployment), None, None))
    }
}
