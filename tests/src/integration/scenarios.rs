//! # Delivery Scenarios
//!
//! Ordering, write visibility, vetoes, policy filtering and handshakes on a
//! single infrastructure bus.

#[cfg(test)]
mod tests {
    use crate::fixtures::{local_infra, Tracer, Quiet, Trace};
    use nos_bus::{DispatchError, Handshake, HandshakeError, InfraEngine};
    use nos_types::{
        component_id, EventPayload, InfraEvent, Permission, PktIn, Role, Status, SubscriberConfig,
    };
    use std::sync::Arc;

    const PUBLISHER: &str = "ofp";

    /// Registers the publisher's handler on `engine` and returns its descriptor.
    fn publisher_on(engine: &InfraEngine) -> SubscriberConfig {
        engine.register_handler(PUBLISHER, Arc::new(Quiet));
        publisher()
    }

    fn publisher() -> SubscriberConfig {
        SubscriberConfig::new(PUBLISHER)
            .with_status(Status::Enabled)
            .outbound("DP_RECEIVE_PACKET")
    }

    fn packet(dpid: u64) -> PktIn {
        PktIn {
            dpid,
            ..PktIn::default()
        }
    }

    fn dpid(payload: &EventPayload) -> u64 {
        match payload {
            EventPayload::PktIn(p) => p.dpid,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    /// A at priority 10 with rwx, B at priority 5 with r.
    fn scenario_one(a_returns: i32) -> (Arc<InfraEngine>, Trace) {
        let engine = local_infra();
        let trace = Trace::default();
        engine.register_handler(
            "a",
            Arc::new(Tracer::new("a", &trace).returning(a_returns).editing(|p| {
                if let EventPayload::PktIn(pkt) = p {
                    pkt.dpid = 99;
                }
            })),
        );
        engine.register_handler("b", Arc::new(Tracer::new("b", &trace)));
        engine
            .reload(&[
                SubscriberConfig::new("b")
                    .with_status(Status::Enabled)
                    .with_priority(5)
                    .inbound_with("DP_RECEIVE_PACKET", Permission::READ),
                SubscriberConfig::new("a")
                    .with_status(Status::Enabled)
                    .with_priority(10)
                    .with_perm(Permission::ALL)
                    .inbound_with("DP_RECEIVE_PACKET", Permission::ALL),
                publisher_on(&engine),
            ])
            .unwrap();
        engine.start_all();
        (engine, trace)
    }

    // =========================================================================
    // SCENARIO 1: ORDER, WRITE VISIBILITY, VETO
    // =========================================================================

    #[test]
    fn test_writer_first_then_reader_sees_mutation() {
        let (engine, trace) = scenario_one(0);
        let ret = engine
            .dp_receive_packet(component_id(PUBLISHER), packet(1))
            .unwrap();
        assert_eq!(ret, 0);

        let seen = trace.seen();
        assert_eq!(trace.names(), vec!["a", "b"]);
        assert!(seen[0].writable);
        assert!(!seen[1].writable);
        assert_eq!(dpid(&seen[1].payload), 99);
    }

    #[test]
    fn test_veto_skips_later_subscribers() {
        let (engine, trace) = scenario_one(1);
        let ret = engine
            .dp_receive_packet(component_id(PUBLISHER), packet(1))
            .unwrap();
        assert_eq!(ret, 1);
        assert_eq!(trace.names(), vec!["a"]);
    }

    #[test]
    fn test_non_zero_without_execute_continues() {
        let engine = local_infra();
        let trace = Trace::default();
        engine.register_handler("a", Arc::new(Tracer::new("a", &trace).returning(1)));
        engine.register_handler("b", Arc::new(Tracer::new("b", &trace)));
        engine
            .reload(&[
                SubscriberConfig::new("a")
                    .with_status(Status::Enabled)
                    .with_priority(10)
                    .with_perm(Permission::READ | Permission::WRITE)
                    .inbound("DP_RECEIVE_PACKET"),
                SubscriberConfig::new("b")
                    .with_status(Status::Enabled)
                    .inbound("DP_RECEIVE_PACKET"),
                publisher_on(&engine),
            ])
            .unwrap();
        engine.start_all();

        let ret = engine
            .dp_receive_packet(component_id(PUBLISHER), packet(1))
            .unwrap();
        assert_eq!(ret, 0);
        assert_eq!(trace.names(), vec!["a", "b"]);
    }

    // =========================================================================
    // SCENARIO 2: POLICY FILTER
    // =========================================================================

    #[test]
    fn test_policy_selects_by_dpid() {
        let engine = local_infra();
        let trace = Trace::default();
        engine.register_handler("c", Arc::new(Tracer::new("c", &trace)));
        engine.register_handler("open", Arc::new(Tracer::new("open", &trace)));
        let mut c = SubscriberConfig::new("c")
            .with_status(Status::Enabled)
            .inbound("DP_RECEIVE_PACKET");
        c.policies = vec!["dpid:5".to_string()];
        engine
            .reload(&[
                c,
                SubscriberConfig::new("open")
                    .with_status(Status::Enabled)
                    .inbound("DP_RECEIVE_PACKET"),
                publisher_on(&engine),
            ])
            .unwrap();
        engine.start_all();

        let ofp = component_id(PUBLISHER);
        engine.dp_receive_packet(ofp, packet(7)).unwrap();
        assert_eq!(trace.names(), vec!["open"]);

        trace.clear();
        engine.dp_receive_packet(ofp, packet(5)).unwrap();
        assert_eq!(trace.names(), vec!["c", "open"]);
    }

    #[test]
    fn test_runtime_policy_change() {
        let engine = local_infra();
        let trace = Trace::default();
        engine.register_handler("c", Arc::new(Tracer::new("c", &trace)));
        engine
            .reload(&[
                SubscriberConfig::new("c")
                    .with_status(Status::Enabled)
                    .inbound("DP_RECEIVE_PACKET"),
                publisher_on(&engine),
            ])
            .unwrap();
        engine.start_all();

        let ofp = component_id(PUBLISHER);
        assert_eq!(engine.add_policy("c", "dpid:5").unwrap(), 1);
        engine.dp_receive_packet(ofp, packet(7)).unwrap();
        assert!(trace.names().is_empty());

        engine.del_policy("c", 1).unwrap();
        engine.dp_receive_packet(ofp, packet(7)).unwrap();
        assert_eq!(trace.names(), vec!["c"]);
    }

    // =========================================================================
    // AUTHORIZATION
    // =========================================================================

    #[test]
    fn test_undeclared_publisher_reaches_nobody() {
        let (engine, trace) = scenario_one(0);
        let result = engine.dp_receive_packet(component_id("intruder"), packet(1));
        assert!(matches!(result, Err(DispatchError::Unauthorized { .. })));
        assert_eq!(result.unwrap_err().code(), -1);
        assert!(trace.names().is_empty());
    }

    // =========================================================================
    // SCENARIO 3: HANDSHAKE
    // =========================================================================

    fn remote_engine() -> Arc<InfraEngine> {
        let engine = local_infra();
        engine
            .reload(&[SubscriberConfig::new("y")
                .with_status(Status::Enabled)
                .with_role(Role::Management)
                .remote("127.0.0.1:1", "127.0.0.1:2")
                .inbound("SW_CONNECTED")])
            .unwrap();
        engine
    }

    fn activated(engine: &InfraEngine, name: &str) -> bool {
        engine.show(name).unwrap().summary.activated
    }

    #[test]
    fn test_mismatched_handshake_is_rejected() {
        let engine = remote_engine();
        let result = engine.handshake(&Handshake {
            id: component_id("y"),
            name: "x".to_string(),
        });
        match result {
            Err(HandshakeError::NameMismatch { expected, given, .. }) => {
                assert_eq!(expected, "y");
                assert_eq!(given, "x");
            }
            other => panic!("expected name mismatch, got {other:?}"),
        }
        assert!(!activated(&engine, "y"));
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let engine = remote_engine();
        let result = engine.handshake(&Handshake {
            id: 42,
            name: "y".to_string(),
        });
        assert!(matches!(result, Err(HandshakeError::UnknownId { id: 42, .. })));
        assert!(!activated(&engine, "y"));
    }

    #[test]
    fn test_handshake_is_idempotent() {
        let engine = remote_engine();
        let hs = Handshake {
            id: component_id("y"),
            name: "y".to_string(),
        };
        engine.handshake(&hs).unwrap();
        engine.handshake(&hs).unwrap();
        assert!(activated(&engine, "y"));
        assert_eq!(engine.list().iter().filter(|s| s.activated).count(), 1);
    }

    #[test]
    fn test_events_are_counted_per_type() {
        let (engine, _trace) = scenario_one(0);
        let ofp = component_id(PUBLISHER);
        for _ in 0..3 {
            engine.dp_receive_packet(ofp, packet(1)).unwrap();
        }
        assert_eq!(engine.event_count(InfraEvent::DpReceivePacket), 3);
        assert_eq!(engine.event_count(InfraEvent::SwConnected), 0);
    }
}
