//! # Request/Response Flows
//!
//! Correlation and timeout behaviour seen from the facade:
//!
//! 1. **Echo**: reply payload equals the request, handle equals the one the
//!    facade generated and handed to the driver
//! 2. **Timeouts**: unsubscribed target with zero and non-zero timeout
//! 3. **Concurrency**: many in-flight requests never cross replies

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use msgbus::{
        Broker, BrokerError, BrokerRegistry, DynBroker, DynMsgHandler, Handle, HandlerError,
        Lifecycle, LifecycleContext, MemoryBroker, Msgbus, MsgbusConfig, MsgbusError,
    };
    use parking_lot::Mutex;
    use tokio::time::{timeout, Instant};

    use crate::integration::started_memory_bus;

    fn echo(payload: &[u8], response_expected: bool) -> Result<Option<Vec<u8>>, HandlerError> {
        Ok(response_expected.then(|| payload.to_vec()))
    }

    /// Memory driver that remembers the handle of every request it carries.
    struct HandleRecorder {
        inner: MemoryBroker,
        handles: Arc<Mutex<Vec<Handle>>>,
    }

    #[async_trait]
    impl Broker for HandleRecorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn register(&self) -> Result<(), BrokerError> {
            self.inner.register().await
        }
        async fn unregister(&self) -> Result<(), BrokerError> {
            self.inner.unregister().await
        }
        async fn register_msg_handler(
            &self,
            target: &str,
            handler: DynMsgHandler,
        ) -> Result<(), BrokerError> {
            self.inner.register_msg_handler(target, handler).await
        }
        async fn unregister_msg_handler(&self, target: &str) -> Result<(), BrokerError> {
            self.inner.unregister_msg_handler(target).await
        }
        async fn send(&self, data: Vec<u8>, target: &str) -> Result<(), BrokerError> {
            self.inner.send(data, target).await
        }
        async fn send_and_wait_response(
            &self,
            data: Vec<u8>,
            target: &str,
            handle: Handle,
            timeout: Duration,
        ) -> Result<Vec<u8>, BrokerError> {
            self.handles.lock().push(handle);
            self.inner
                .send_and_wait_response(data, target, handle, timeout)
                .await
        }
    }

    async fn recorder_bus() -> (Msgbus, Arc<Mutex<Vec<Handle>>>) {
        let handles = Arc::new(Mutex::new(Vec::new()));
        let shared = handles.clone();

        let mut registry = BrokerRegistry::new();
        registry
            .register_factory("recorder", move |config: &MsgbusConfig| {
                let broker = HandleRecorder {
                    inner: MemoryBroker::new(&config.msgbus_uri),
                    handles: shared.clone(),
                };
                Ok(Arc::new(broker) as DynBroker)
            })
            .unwrap();

        let bus = Msgbus::new(
            MsgbusConfig::new("recorder", "memory://recorder"),
            Arc::new(registry),
        );
        bus.start(&LifecycleContext::detached()).await.unwrap();
        (bus, handles)
    }

    #[tokio::test]
    async fn test_scenario_match_replies_ca_va() {
        let bus = started_memory_bus().await;
        bus.register_msg_handler("match", |_: &[u8], _: bool| -> Result<Option<Vec<u8>>, HandlerError> {
            Ok(Some(b"ca va!".to_vec()))
        })
        .await
        .unwrap();

        let (reply, _) = bus
            .send_and_wait_response(b"ping", "match", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"ca va!");
    }

    #[tokio::test]
    async fn test_echo_returns_payload_and_request_handle() {
        let (bus, handles) = recorder_bus().await;
        bus.register_msg_handler("echo", echo).await.unwrap();

        let (reply, handle) = bus
            .send_and_wait_response(b"Mr. Watson--come here", "echo", Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(reply, b"Mr. Watson--come here");
        assert_eq!(*handles.lock(), vec![handle]);
    }

    #[tokio::test]
    async fn test_every_request_gets_a_fresh_handle() {
        let (bus, handles) = recorder_bus().await;
        bus.register_msg_handler("echo", echo).await.unwrap();

        let mut returned = Vec::new();
        for _ in 0..8 {
            let (_, handle) = bus
                .send_and_wait_response(b"x", "echo", Duration::ZERO)
                .await
                .unwrap();
            returned.push(handle);
        }

        assert_eq!(*handles.lock(), returned);
        let mut unique = returned.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), returned.len());
    }

    #[tokio::test]
    async fn test_zero_timeout_without_handler_returns_immediately() {
        let bus = started_memory_bus().await;

        let result = timeout(
            Duration::from_secs(1),
            bus.send_and_wait_response(b"ping", "nobody", Duration::ZERO),
        )
        .await
        .expect("a zero timeout against an empty target must not block");

        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_handler_waits_full_period() {
        let bus = started_memory_bus().await;
        let wait = Duration::from_millis(250);

        let started = Instant::now();
        let err = bus
            .send_and_wait_response(b"ping", "nobody", wait)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= wait);
        assert!(matches!(
            err,
            MsgbusError::Broker(BrokerError::Timeout { ref target, .. }) if target == "nobody"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_discarded_and_bus_recovers() {
        let mut registry = BrokerRegistry::new();
        registry
            .register_factory("slow", |config: &MsgbusConfig| {
                let broker = MemoryBroker::new(&config.msgbus_uri)
                    .with_transport_delay(Duration::from_millis(50));
                Ok(Arc::new(broker) as DynBroker)
            })
            .unwrap();
        let bus = Msgbus::new(MsgbusConfig::new("slow", ""), Arc::new(registry));
        bus.start(&LifecycleContext::detached()).await.unwrap();
        bus.register_msg_handler("echo", echo).await.unwrap();

        // Expires well before the transport delay.
        let err = bus
            .send_and_wait_response(b"ping", "echo", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let (reply, _) = bus
            .send_and_wait_response(b"pong", "echo", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"pong");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_correlate() {
        let bus = Arc::new(started_memory_bus().await);
        bus.register_msg_handler("echo", echo).await.unwrap();

        let tasks: Vec<_> = (0..64u32)
            .map(|i| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    let payload = format!("request-{i}").into_bytes();
                    let (reply, _) = bus
                        .send_and_wait_response(&payload, "echo", Duration::from_secs(5))
                        .await
                        .unwrap();
                    assert_eq!(reply, payload);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_request_without_handler_reply_is_integrity_fault() {
        let bus = started_memory_bus().await;
        bus.register_msg_handler("mute", |_: &[u8], _: bool| -> Result<Option<Vec<u8>>, HandlerError> {
            Ok(None)
        })
        .await
        .unwrap();

        let err = bus
            .send_and_wait_response(b"ping", "mute", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_integrity_fault());
        assert!(!err.is_timeout());
    }
}
