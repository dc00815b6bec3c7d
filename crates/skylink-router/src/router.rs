//! Frame parsing and synchronous fan-out.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use skylink_protocol::{Codec, Envelope, JsonCodec, ProtocolError};
use tracing::{debug, trace, warn};

use crate::{Diagnostic, Diagnostics, Registry};

/// Turns frames into envelopes and delivers them to matching listeners.
///
/// Dispatch runs on the caller's thread, in frame order, and calls
/// listeners in registration order. A listener that panics is reported on
/// [`Diagnostics`] and skipped; the rest still run.
pub struct Router {
    registry: Registry,
    codec: Box<dyn Codec>,
    diagnostics: Diagnostics,
}

impl Router {
    /// Creates a router using [`JsonCodec`].
    pub fn new(registry: Registry, diagnostics: Diagnostics) -> Self {
        Self::with_codec(registry, diagnostics, JsonCodec)
    }

    pub fn with_codec(
        registry: Registry,
        diagnostics: Diagnostics,
        codec: impl Codec,
    ) -> Self {
        Self {
            registry,
            codec: Box::new(codec),
            diagnostics,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Parses a frame without dispatching or reporting anything.
    pub fn parse(&self, frame: &str) -> Result<Envelope, ProtocolError> {
        self.codec.decode(frame)
    }

    /// Records a frame that failed to parse.
    pub fn report_parse_error(&self, error: &ProtocolError, frame: &str) {
        debug!(error = %error, "dropping unparseable frame");
        self.diagnostics.emit(Diagnostic::parse_error(error, frame));
    }

    /// Delivers `envelope` to every matching listener.
    ///
    /// Reserved kinds (ping/pong) are never delivered. Returns the number
    /// of listeners invoked, counting ones that panicked.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let kind = envelope.kind();
        if kind.is_reserved() {
            trace!(%kind, "reserved kind not dispatched");
            return 0;
        }

        let room = envelope.room();
        let listeners = self.registry.matching(kind, room.as_ref());
        trace!(%kind, room = ?room, listeners = listeners.len(), "dispatching");

        for listener in &listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(envelope))) {
                let message = panic_message(payload.as_ref());
                warn!(%kind, %message, "listener panicked");
                self.diagnostics.emit(Diagnostic::ListenerPanicked {
                    kind: kind.clone(),
                    message,
                });
            }
        }
        listeners.len()
    }

    /// Parses and dispatches one frame.
    ///
    /// A frame that fails to parse is reported and its error returned; no
    /// listener sees it.
    pub fn route(&self, frame: &str) -> Result<usize, ProtocolError> {
        match self.parse(frame) {
            Ok(envelope) => Ok(self.dispatch(&envelope)),
            Err(e) => {
                self.report_parse_error(&e, frame);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
