//! # Integrity Faults
//!
//! Corruption and misrouting must surface as integrity faults, never as a
//! normal error or a wrong payload:
//!
//! 1. **Corrupted reply bytes**: the facade's hash check rejects them
//! 2. **Reply for another handle**: the facade's correlation check rejects it
//! 3. **Corrupted request bytes**: the driver rejects them before the handler

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use msgbus::{
        Broker, BrokerError, BrokerRegistry, DynBroker, DynMsgHandler, Handle, HandlerError,
        Lifecycle, LifecycleContext, MemoryBroker, Msgbus, MsgbusConfig,
    };
    use msgbus_types::{Envelope, HASH_LEN};

    fn echo(payload: &[u8], response_expected: bool) -> Result<Option<Vec<u8>>, HandlerError> {
        Ok(response_expected.then(|| payload.to_vec()))
    }

    #[derive(Clone, Copy)]
    enum Tamper {
        /// Flip one bit inside the reply's hash.
        FlipHashBit,
        /// Re-address the reply to a fresh handle, with a valid hash.
        ForeignHandle,
    }

    /// Memory driver whose replies are tampered with on the way back.
    struct TamperingBroker {
        inner: MemoryBroker,
        tamper: Tamper,
    }

    #[async_trait]
    impl Broker for TamperingBroker {
        fn name(&self) -> &str {
            "tampering"
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
            let mut reply = self
                .inner
                .send_and_wait_response(data, target, handle, timeout)
                .await?;

            match self.tamper {
                Tamper::FlipHashBit => {
                    let last = reply.len() - HASH_LEN;
                    reply[last] ^= 0x01;
                    Ok(reply)
                }
                Tamper::ForeignHandle => {
                    let mut envelope = Envelope::decode(&reply)?;
                    envelope.set_handle(Handle::new_v4());
                    envelope.generate_hash();
                    Ok(envelope.encode()?)
                }
            }
        }
    }

    async fn tampering_bus(tamper: Tamper) -> Msgbus {
        let mut registry = BrokerRegistry::new();
        registry
            .register_factory("tampering", move |config: &MsgbusConfig| {
                let broker = TamperingBroker {
                    inner: MemoryBroker::new(&config.msgbus_uri),
                    tamper,
                };
                Ok(Arc::new(broker) as DynBroker)
            })
            .unwrap();

        let bus = Msgbus::new(MsgbusConfig::new("tampering", ""), Arc::new(registry));
        bus.start(&LifecycleContext::detached()).await.unwrap();
        bus.register_msg_handler("echo", echo).await.unwrap();
        bus
    }

    #[tokio::test]
    async fn test_corrupted_reply_is_integrity_fault() {
        let bus = tampering_bus(Tamper::FlipHashBit).await;
        let err = bus
            .send_and_wait_response(b"ping", "echo", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_integrity_fault());
    }

    #[tokio::test]
    async fn test_reply_for_another_handle_is_integrity_fault() {
        let bus = tampering_bus(Tamper::ForeignHandle).await;
        let err = bus
            .send_and_wait_response(b"ping", "echo", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_integrity_fault());
    }

    #[tokio::test]
    async fn test_bus_keeps_serving_after_integrity_fault() {
        let bus = tampering_bus(Tamper::FlipHashBit).await;
        for _ in 0..3 {
            let err = bus
                .send_and_wait_response(b"ping", "echo", Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(err.is_integrity_fault());
        }

        // Fire-and-forget traffic is untouched by the tampering.
        bus.send(b"ping", "echo").await.unwrap();
        assert!(bus.is_running());
    }

    #[tokio::test]
    async fn test_corrupted_request_never_reaches_handler() {
        let broker = MemoryBroker::new("");
        broker.register().await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: DynMsgHandler = Arc::new(
            move |payload: &[u8], _: bool| -> Result<Option<Vec<u8>>, HandlerError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(payload.to_vec()))
            },
        );
        broker.register_msg_handler("echo", handler).await.unwrap();

        let mut request = Envelope::request(b"ping".to_vec());
        request.generate_hash();
        let mut bytes = request.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let err = broker.send(bytes.clone(), "echo").await.unwrap_err();
        assert!(err.is_integrity_fault());

        let err = broker
            .send_and_wait_response(bytes, "echo", request.handle(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_integrity_fault());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
