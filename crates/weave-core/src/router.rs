//! The router.
//!
//! One recursive primitive delivers every message, seen from the service
//! currently handling it:
//!
//! 1. The target (`msg.name`, promoted to a fullname) belongs to another
//!    process: learn a route from `msg.gateway` if the hop stamped one,
//!    resolve the gateway service and hand it the message.  Unresolvable
//!    targets are logged and dropped.
//! 2. The target is another local service: look it up and recurse from its
//!    perspective.  Unknown services are logged and dropped.
//! 3. The target is the current service: invoke the method with `data` as
//!    positional arguments.  A missing method or a failing handler is
//!    logged and answers `null`.
//! 4. After a successful invocation, send the result to every listener of
//!    the method, in registration order, as
//!    `{name: callbackName, method: callbackMethod, data: [result], sender: self}`.
//!
//! Publish, call and remote forward are all this one path.

use serde_json::Value;
use tracing::{debug, error, warn};

use weave_types::Message;
use weave_types::address::{id_of, promote};

use crate::methods::BASE_METHODS;
use crate::runtime::Runtime;
use crate::service::{Invocation, Service};

impl Runtime {
    /// Deliver `msg` as seen from the runtime service.
    pub fn dispatch(&self, msg: Message) -> Value {
        let _gate = self.enter();
        match self.runtime_service() {
            Some(runtime) => self.route(&runtime, msg),
            None => {
                error!(target = %msg.name, "runtime service missing, dropping message");
                Value::Null
            }
        }
    }

    /// Invoke `method` on the runtime service itself.
    pub fn invoke(&self, method: &str, data: Vec<Value>) -> Value {
        let _gate = self.enter();
        match self.runtime_service() {
            Some(runtime) => self.invoke_on(&runtime, method, data),
            None => Value::Null,
        }
    }

    /// Invoke `method` on `service`, sent from the service itself.
    pub fn invoke_on(&self, service: &Service, method: &str, data: Vec<Value>) -> Value {
        let msg = Message::new(service.fullname(), method, data).with_sender(service.fullname());
        self.route(service, msg)
    }

    /// Route `msg` from the perspective of `current`.
    pub fn route(&self, current: &Service, mut msg: Message) -> Value {
        let _gate = self.enter();

        let target = match promote(&msg.name, self.id()) {
            Ok(target) => target,
            Err(e) => {
                warn!(method = %msg.method, sender = ?msg.sender, error = %e, "dropping unaddressable message");
                return Value::Null;
            }
        };
        msg.name.clone_from(&target);
        let target_id = id_of(&target).unwrap_or(self.id());

        // Remote process.
        if target_id != self.id() {
            if let Some(gateway) = msg.gateway.as_deref() {
                self.add_route(target_id, msg.gateway_id.as_deref().unwrap_or_default(), gateway);
            }
            let Some(gateway) = self.get_gateway(target_id) else {
                error!(target = %target, method = %msg.method, "no gateway for remote id {target_id}");
                return Value::Null;
            };
            debug!(target = %target, method = %msg.method, gateway = %gateway.fullname(), "forwarding");
            return gateway.behavior().send_remote(self, &gateway, msg);
        }

        // Another local service.
        if target != current.fullname() {
            let Some(service) = self.get_service(&target) else {
                error!(target = %target, method = %msg.method, "service not found");
                return Value::Null;
            };
            return self.route(&service, msg);
        }

        self.invoke_local(current, msg)
    }

    /// Invoke `msg.method` on `service` and fan the result out to its
    /// listeners, regardless of the service's process id.  Local
    /// placeholders use this to answer intercepted methods.
    pub fn invoke_local(&self, service: &Service, msg: Message) -> Value {
        let _gate = self.enter();
        debug!(sender = ?msg.sender, target = %service.fullname(), method = %msg.method, "invoke");

        let outcome = {
            let inv = Invocation::new(self, service, &msg);
            service
                .behavior()
                .call(&msg.method, &inv)
                .or_else(|| BASE_METHODS.call(service, &msg.method, &inv))
        };
        let result = match outcome {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                error!(service = %service.fullname(), method = %msg.method, error = %e, "invocation failed");
                return Value::Null;
            }
            None => {
                error!(service = %service.fullname(), method = %msg.method, "method not found");
                return Value::Null;
            }
        };

        for listener in service.listeners(&msg.method) {
            let notify = Message::new(
                listener.callback_name,
                listener.callback_method,
                vec![result.clone()],
            )
            .with_sender(service.fullname());
            self.route(service, notify);
        }
        result
    }

    /// Forward `msg` over the transport that reaches its target process.
    ///
    /// Fire-and-forget: always answers `null`, failures are logged.
    pub fn send_remote(&self, msg: Message) -> Value {
        let _gate = self.enter();
        let Some(target_id) = id_of(&msg.name) else {
            error!(target = %msg.name, "send_remote: target has no process id");
            return Value::Null;
        };
        let Some(route_id) = self.route_id(target_id) else {
            error!(target = %msg.name, "send_remote: no route to {target_id}");
            return Value::Null;
        };
        let Some(transport) = self.transport(&route_id) else {
            error!(target = %msg.name, route_id = %route_id, "send_remote: no transport attached");
            return Value::Null;
        };
        match msg.to_json() {
            Ok(frame) => {
                if let Err(e) = transport.send(frame) {
                    error!(target = %msg.name, route_id = %route_id, error = %e, "send_remote failed");
                }
            }
            Err(e) => error!(target = %msg.name, error = %e, "send_remote: encode failed"),
        }
        Value::Null
    }

    /// Connection boundary: decode one inbound frame, stamp the hop, learn
    /// a route back to the sender's process and dispatch.
    ///
    /// Malformed frames are logged and dropped; the connection stays up.
    pub fn handle_inbound(&self, gateway_id: &str, frame: &str) -> Value {
        let mut msg = match Message::from_json(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(gateway_id, error = %e, "dropping malformed frame");
                return Value::Null;
            }
        };
        let _gate = self.enter();
        msg.stamp_gateway(gateway_id, self.fullname());
        if let Some(remote_id) = msg.sender.as_deref().and_then(id_of) {
            if remote_id != self.id() {
                self.add_route(remote_id, gateway_id, self.fullname());
            }
        }
        if id_of(&msg.name).is_none() {
            debug!(gateway_id, target = %msg.name, "inbound message not fully addressed");
        }
        self.retain(&msg);
        self.dispatch(msg)
    }
}
