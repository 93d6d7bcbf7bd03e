//! Two runtimes in one test process, joined by channel transports.
//!
//! `P2` plays the connecting side: it registers an outbound connection to
//! `P1` and sends the bootstrap handshake.  Frames are pumped by hand, so
//! every exchange settles deterministically.

use std::any::Any;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use weave_core::{Invocation, MethodTable, Runtime, Service, ServiceBehavior, TransportHandle};
use weave_types::{Direction, LaunchAction, LaunchDescription, Message, ServiceIdentity, WeaveError};

#[derive(Default)]
struct Sink {
    received: Mutex<Vec<Value>>,
}

static SINK_METHODS: LazyLock<MethodTable<Sink>> = LazyLock::new(|| {
    MethodTable::<Sink>::new().with("onEpoch", |sink, inv| {
        sink.received.lock().push(inv.arg(0)?);
        Ok(Value::Null)
    })
});

impl ServiceBehavior for Sink {
    fn call(&self, method: &str, inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        SINK_METHODS.call(self, method, inv)
    }

    fn method_names(&self) -> Vec<&'static str> {
        SINK_METHODS.names()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Link {
    a: Arc<Runtime>,
    b: Arc<Runtime>,
    a_to_b: UnboundedReceiver<String>,
    b_to_a: UnboundedReceiver<String>,
}

impl Link {
    /// `P2` connects to `P1` and sends its handshake.
    fn connect() -> Self {
        let a = Runtime::builder("P1").with_hostname("alpha").build();
        let b = Runtime::builder("P2").with_hostname("beta").build();

        let mut ld = LaunchDescription::new("beta");
        ld.add_action(LaunchAction::new("clock", "c1"));
        b.launch(&ld);

        let (to_b, a_to_b) = TransportHandle::channel();
        let (to_a, b_to_a) = TransportHandle::channel();
        a.register_connection(a.fullname(), "P2", "ws://beta:3001", Direction::Inbound, Some(to_b));
        b.register_connection(b.fullname(), "P1", "ws://alpha:3001", Direction::Outbound, Some(to_a));

        let link = Self { a, b, a_to_b, b_to_a };
        for msg in link.b.handshake_messages("P1") {
            link.b.send_remote(msg);
        }
        link
    }

    /// Deliver frames both ways until both directions are idle.
    fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..1000 {
            let mut moved = false;
            while let Ok(frame) = self.b_to_a.try_recv() {
                self.a.handle_inbound("P2", &frame);
                delivered += 1;
                moved = true;
            }
            while let Ok(frame) = self.a_to_b.try_recv() {
                self.b.handle_inbound("P1", &frame);
                delivered += 1;
                moved = true;
            }
            if !moved {
                return delivered;
            }
        }
        panic!("link did not settle");
    }
}

#[test]
fn handshake_mirrors_both_registries() {
    let mut link = Link::connect();
    assert!(link.pump() > 0);

    let a_names = link.a.service_names();
    assert!(a_names.contains(&"runtime@P2".to_string()));
    assert!(a_names.contains(&"c1@P2".to_string()));
    assert!(link.a.processes().contains_key("P2@beta"));
    assert!(link.a.hosts().contains_key("beta"));

    let b_names = link.b.service_names();
    assert!(b_names.contains(&"runtime@P1".to_string()));

    // Each side keeps its own entries.
    assert_eq!(link.a.get_service("runtime").unwrap().type_key(), "Runtime");
    assert!(link.b.get_service("c1").unwrap().is_ready());

    // A later registration on P1 reaches P2 through the registry listener.
    let mut ld = LaunchDescription::new("alpha");
    ld.add_action(LaunchAction::new("clock", "tick"));
    link.a.launch(&ld);
    link.pump();
    assert!(link.b.get_service("tick@P1").is_some());
}

#[test]
fn remote_publish_reaches_local_listener() {
    let mut link = Link::connect();
    link.pump();

    let identity = ServiceIdentity::new("sink", "P1", "Sink", "0.0.1").unwrap();
    let sink = link
        .a
        .register(Arc::new(Service::new(identity, Box::new(Sink::default()))));

    link.a.dispatch(Message::new(
        "c1@P2",
        "addListener",
        vec![json!("publishEpoch"), json!("sink@P1"), json!("onEpoch")],
    ));
    link.pump();
    let clock = link.b.get_service("c1").unwrap();
    assert_eq!(clock.listeners("publishEpoch")[0].callback_name, "sink@P1");

    let forwarded = link.a.dispatch(Message::new("c1@P2", "publishEpoch", vec![]));
    assert_eq!(forwarded, Value::Null, "remote calls are fire-and-forget");
    link.pump();

    let received = sink.behavior_as::<Sink>().unwrap().received.lock().clone();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_i64());

    let retained = link.a.retained("c1@P2", "onEpoch").unwrap();
    assert_eq!(retained.gateway_id.as_deref(), Some("P2"));
    assert_eq!(retained.gateway.as_deref(), Some("runtime@P1"));
}

#[test]
fn closed_connection_releases_mirrors() {
    let mut link = Link::connect();
    link.pump();
    assert!(link.a.get_service("c1@P2").is_some());

    link.a.connection_closed("P2");

    assert!(link.a.get_service("c1@P2").is_none());
    assert!(link.a.get_service("runtime@P2").is_none());
    assert!(link.a.connections().is_empty());
    assert!(link.a.route_table().is_empty());
    assert!(link.a.get_service("runtime@P1").is_some());

    // Nothing routes to P2 any more.
    assert_eq!(link.a.dispatch(Message::new("c1@P2", "publishEpoch", vec![])), Value::Null);
    assert!(link.a_to_b.try_recv().is_err());
}
