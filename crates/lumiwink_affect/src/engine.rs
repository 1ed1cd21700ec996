//! Emotion Priority Engine
//!
//! Keeps exactly one active overlay, a FIFO of deferred ones, and the
//! per-name timestamps used for rate limiting.
//!
//! A new request either takes over immediately (nothing active, or it
//! strictly outranks the active one, which is pushed back to the FRONT of
//! the queue) or waits at the BACK of the queue. Nothing is ever discarded
//! except rate-limited requests.

use lumiwink_core::{EmotionRequest, LumiConfig, Outbound, Publisher, DEFAULT_INTENSITY};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// What happened to an emitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Nothing was active; the request is now active
    Activated,
    /// The request displaced a lower-priority overlay
    Preempted,
    /// The request is waiting behind the active overlay
    Queued,
    /// Dropped: the same name fired too recently
    RateLimited,
}

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub active: Option<EmotionRequest>,
    pub pending: Vec<EmotionRequest>,
}

#[derive(Debug)]
struct ActiveOverlay {
    request: EmotionRequest,
    since: Instant,
}

#[derive(Debug, Default)]
struct Overlays {
    active: Option<ActiveOverlay>,
    pending: VecDeque<EmotionRequest>,
    /// name → last successful activation
    last_fired: HashMap<String, Instant>,
}

impl Overlays {
    fn can_fire(&self, name: &str, min_interval: std::time::Duration, now: Instant) -> bool {
        match self.last_fired.get(name) {
            Some(last) => now.duration_since(*last) >= min_interval,
            None => true,
        }
    }

    /// Make `request` active and return what must be announced.
    fn activate(&mut self, request: EmotionRequest, now: Instant) -> EmotionRequest {
        self.last_fired.insert(request.name.clone(), now);
        self.active = Some(ActiveOverlay {
            request: request.clone(),
            since: now,
        });
        request
    }

    /// End the active overlay and promote the next one.
    ///
    /// Returns the newly active request, or `None` when the device simply
    /// stays at rest (an expiring `neutral` with nothing queued).
    fn expire(&mut self, now: Instant) -> Option<EmotionRequest> {
        let expired = self.active.take();
        if let Some(next) = self.pending.pop_front() {
            return Some(self.activate(next, now));
        }
        match expired {
            Some(a) if a.request.name == "neutral" => None,
            _ => Some(self.activate(EmotionRequest::neutral(), now)),
        }
    }
}

/// The emotion arbitration engine.
///
/// All mutation happens under one mutex; notifications are published only
/// after it has been released.
pub struct EmotionEngine {
    overlays: Mutex<Overlays>,
    config: Arc<LumiConfig>,
    publisher: Arc<dyn Publisher>,
}

impl EmotionEngine {
    pub fn new(config: Arc<LumiConfig>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            overlays: Mutex::new(Overlays::default()),
            config,
            publisher,
        }
    }

    /// Request an emotion overlay.
    ///
    /// `ttl_ms` falls back to the configured default for `name`, then to the
    /// global fallback.
    pub async fn emit(&self, name: &str, intensity: f64, ttl_ms: Option<u64>) -> EmitOutcome {
        let now = Instant::now();
        let min_interval = self.config.min_interval(name);

        let (outcome, announce) = {
            let mut overlays = self.overlays.lock().await;
            if !overlays.can_fire(name, min_interval, now) {
                tracing::trace!("Emotion {} rate-limited", name);
                return EmitOutcome::RateLimited;
            }

            let ttl_ms = ttl_ms.unwrap_or_else(|| self.config.default_ttl_ms(name));
            let request = EmotionRequest::new(name, intensity, ttl_ms);

            match overlays.active.take() {
                None => (
                    EmitOutcome::Activated,
                    Some(overlays.activate(request, now)),
                ),
                Some(current) if request.outranks(&current.request) => {
                    tracing::debug!(
                        "Emotion {} preempts {}",
                        request.name,
                        current.request.name
                    );
                    overlays.pending.push_front(current.request);
                    (
                        EmitOutcome::Preempted,
                        Some(overlays.activate(request, now)),
                    )
                }
                Some(current) => {
                    overlays.active = Some(current);
                    tracing::debug!(
                        "Emotion {} queued (depth {})",
                        request.name,
                        overlays.pending.len() + 1
                    );
                    overlays.pending.push_back(request);
                    (EmitOutcome::Queued, None)
                }
            }
        };

        if let Some(request) = announce {
            self.announce(request);
        }
        outcome
    }

    /// [`emit`](Self::emit) with the default intensity and TTL.
    pub async fn emit_default(&self, name: &str) -> EmitOutcome {
        self.emit(name, DEFAULT_INTENSITY, None).await
    }

    /// Unconditionally end the active overlay and promote the next one.
    pub async fn expire(&self) {
        let announce = {
            let mut overlays = self.overlays.lock().await;
            overlays.expire(Instant::now())
        };
        if let Some(request) = announce {
            self.announce(request);
        }
    }

    /// Expire the active overlay if its TTL has elapsed at `now`.
    ///
    /// The deadline check and the expiry happen under the same lock, so an
    /// overlay activated between the two can never be cut short.
    pub async fn expire_if_due(&self, now: Instant) -> bool {
        let announce = {
            let mut overlays = self.overlays.lock().await;
            let due = match &overlays.active {
                Some(a) => now.duration_since(a.since) >= a.request.ttl(),
                None => false,
            };
            if !due {
                return false;
            }
            overlays.expire(now)
        };
        if let Some(request) = announce {
            self.announce(request);
        }
        true
    }

    pub async fn active(&self) -> Option<EmotionRequest> {
        self.overlays
            .lock()
            .await
            .active
            .as_ref()
            .map(|a| a.request.clone())
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let overlays = self.overlays.lock().await;
        EngineSnapshot {
            active: overlays.active.as_ref().map(|a| a.request.clone()),
            pending: overlays.pending.iter().cloned().collect(),
        }
    }

    fn announce(&self, request: EmotionRequest) {
        tracing::debug!(
            "Active emotion: {} (intensity={:.2}, ttl={}ms)",
            request.name,
            request.intensity,
            request.ttl_ms
        );
        self.publisher.publish(Outbound::ActiveEmotion(request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumiwink_core::ChannelPublisher;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn engine_with(config: LumiConfig) -> (EmotionEngine, UnboundedReceiver<Outbound>) {
        let (publisher, rx) = ChannelPublisher::new();
        (EmotionEngine::new(Arc::new(config), Arc::new(publisher)), rx)
    }

    fn drain_names(rx: &mut UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outbound::ActiveEmotion(req) = msg {
                names.push(req.name);
            }
        }
        names
    }

    #[tokio::test]
    async fn test_first_emit_activates() {
        let (engine, mut rx) = engine_with(LumiConfig::default());
        assert_eq!(engine.emit("happy", 0.6, None).await, EmitOutcome::Activated);

        let active = engine.active().await.unwrap();
        assert_eq!(active.name, "happy");
        assert_eq!(active.ttl_ms, 2000);
        assert_eq!(drain_names(&mut rx), vec!["happy"]);
    }

    #[tokio::test]
    async fn test_higher_priority_preempts_and_requeues_front() {
        let (engine, mut rx) = engine_with(LumiConfig::default());
        engine.emit("focused", 0.5, None).await;
        engine.emit("calm", 0.4, Some(1200)).await;
        assert_eq!(
            engine.emit("surprised", 0.9, Some(900)).await,
            EmitOutcome::Preempted
        );

        let snap = engine.snapshot().await;
        assert_eq!(snap.active.unwrap().name, "surprised");
        let pending: Vec<_> = snap.pending.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(pending, vec!["focused", "calm"]);
        assert_eq!(drain_names(&mut rx), vec!["focused", "surprised"]);
    }

    #[tokio::test]
    async fn test_calm_then_surprised() {
        let (engine, _rx) = engine_with(LumiConfig::default());
        engine.emit("calm", 0.4, Some(1200)).await;
        engine.emit("surprised", 0.9, Some(900)).await;

        let snap = engine.snapshot().await;
        assert_eq!(snap.active.unwrap().name, "surprised");
        assert_eq!(snap.pending[0].name, "calm");
    }

    #[tokio::test]
    async fn test_lower_or_equal_priority_queues_back() {
        let (engine, mut rx) = engine_with(LumiConfig::default());
        engine.emit("happy", 0.6, None).await;
        assert_eq!(engine.emit("calm", 0.4, None).await, EmitOutcome::Queued);
        assert_eq!(engine.emit("happy", 0.9, None).await, EmitOutcome::Queued);

        let snap = engine.snapshot().await;
        assert_eq!(snap.active.unwrap().name, "happy");
        let pending: Vec<_> = snap.pending.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(pending, vec!["calm", "happy"]);
        // Queueing is silent
        assert_eq!(drain_names(&mut rx), vec!["happy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_drops_second_emit() {
        let config: LumiConfig = toml::from_str(
            r#"
[rate_limits.surprised]
min_interval_ms = 2000
"#,
        )
        .unwrap();
        let (engine, mut rx) = engine_with(config);

        assert_eq!(engine.emit("surprised", 0.9, None).await, EmitOutcome::Activated);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            engine.emit("surprised", 0.9, None).await,
            EmitOutcome::RateLimited
        );
        assert_eq!(drain_names(&mut rx), vec!["surprised"]);
        assert!(engine.snapshot().await.pending.is_empty());

        tokio::time::advance(Duration::from_millis(1600)).await;
        assert_ne!(
            engine.emit("surprised", 0.9, None).await,
            EmitOutcome::RateLimited
        );
    }

    #[tokio::test]
    async fn test_configured_ttl_used_when_not_explicit() {
        let config: LumiConfig = toml::from_str(
            r#"
[emotion_profiles.happy]
ttl_ms = 2500
"#,
        )
        .unwrap();
        let (engine, _rx) = engine_with(config);
        engine.emit("happy", 0.6, None).await;
        assert_eq!(engine.active().await.unwrap().ttl_ms, 2500);
    }

    #[tokio::test]
    async fn test_expire_promotes_queue_head() {
        let (engine, mut rx) = engine_with(LumiConfig::default());
        engine.emit("happy", 0.6, None).await;
        engine.emit("calm", 0.4, None).await;
        engine.emit("focused", 0.4, None).await;
        drain_names(&mut rx);

        engine.expire().await;
        let snap = engine.snapshot().await;
        assert_eq!(snap.active.unwrap().name, "calm");
        assert_eq!(snap.pending.len(), 1);
        assert_eq!(drain_names(&mut rx), vec!["calm"]);
    }

    #[tokio::test]
    async fn test_expire_empty_queue_falls_back_to_neutral() {
        let (engine, mut rx) = engine_with(LumiConfig::default());
        engine.emit("happy", 0.6, None).await;
        drain_names(&mut rx);

        engine.expire().await;
        let active = engine.active().await.unwrap();
        assert_eq!(active, EmotionRequest::neutral());
        assert_eq!(drain_names(&mut rx), vec!["neutral"]);

        // Resting neutral expires quietly
        engine.expire().await;
        assert!(engine.active().await.is_none());
        assert!(drain_names(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_promotion_ignores_rate_limit_but_records_timestamp() {
        let config: LumiConfig = toml::from_str(
            r#"
[rate_limits.calm]
min_interval_ms = 10000
"#,
        )
        .unwrap();
        let (engine, _rx) = engine_with(config);
        engine.emit("happy", 0.6, None).await;
        engine.emit("calm", 0.4, None).await;
        engine.expire().await;
        assert_eq!(engine.active().await.unwrap().name, "calm");

        // calm was just activated through promotion, so a fresh emit is limited
        assert_eq!(engine.emit("calm", 0.4, None).await, EmitOutcome::RateLimited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_due_respects_ttl() {
        let (engine, _rx) = engine_with(LumiConfig::default());
        engine.emit("surprised", 0.9, Some(900)).await;

        tokio::time::advance(Duration::from_millis(899)).await;
        assert!(!engine.expire_if_due(Instant::now()).await);
        assert_eq!(engine.active().await.unwrap().name, "surprised");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(engine.expire_if_due(Instant::now()).await);
        assert_eq!(engine.active().await.unwrap().name, "neutral");
    }

    #[tokio::test]
    async fn test_unknown_name_never_preempts() {
        let (engine, _rx) = engine_with(LumiConfig::default());
        engine.emit("neutral", 0.5, None).await;
        assert_eq!(engine.emit("bewildered", 0.5, None).await, EmitOutcome::Queued);
        assert_eq!(engine.active().await.unwrap().name, "neutral");
    }

    #[tokio::test]
    async fn test_emit_default_intensity() {
        let (engine, _rx) = engine_with(LumiConfig::default());
        engine.emit_default("curious").await;
        let active = engine.active().await.unwrap();
        assert!((active.intensity - DEFAULT_INTENSITY).abs() < 1e-9);
    }
}
