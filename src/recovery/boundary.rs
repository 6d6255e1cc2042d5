//! Outermost guard around handler invocation.

use std::panic::{self, AssertUnwindSafe};

use tracing::Span;

use crate::envelope::EnvelopeBuilder;
use crate::http::sink::ResponseSink;
use crate::recovery::fault::{CaptureGuard, Fault};

/// Request state the boundary can escalate a fault into.
pub trait Recoverable {
    /// Record a recovered fault as an internal server error.
    fn record_fault(&mut self, fault: Fault);

    /// Send the response if nothing has been sent yet.
    fn finish(&mut self);

    /// Forget state that may fault again when the response is sent.
    fn discard_payload(&mut self);

    /// Send a fixed internal server error body if nothing has been sent yet.
    fn finish_literal(&mut self);
}

impl<S: ResponseSink> Recoverable for EnvelopeBuilder<S> {
    fn record_fault(&mut self, fault: Fault) {
        EnvelopeBuilder::record_fault(self, fault);
    }

    fn finish(&mut self) {
        if self.is_sent() {
            return;
        }
        // Failures are logged by the builder; there is no one left to tell.
        let _ = self.send(None);
    }

    fn discard_payload(&mut self) {
        EnvelopeBuilder::discard_payload(self);
    }

    fn finish_literal(&mut self) {
        self.send_literal();
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryBoundary {
    debug: bool,
    span: Span,
}

impl RecoveryBoundary {
    pub fn new(debug: bool, span: Span) -> Self {
        Self { debug, span }
    }

    /// Run `f`, converting a panic into a [`Fault`].
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R, Fault> {
        let capture = CaptureGuard::arm(self.debug);
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => {
                let fault = Fault::from_panic(payload, capture.take_site());
                tracing::error!(
                    parent: &self.span,
                    fault = %fault,
                    location = fault.location.as_deref().unwrap_or("unknown"),
                    "Recovered from panic"
                );
                Err(fault)
            }
        }
    }

    /// Invoke `handler` on `target`; on panic record the fault, then make
    /// sure exactly one response goes out.
    ///
    /// The final send runs inside the boundary too. If it faults, it is
    /// retried once without the payload, and after that the literal fallback
    /// body is committed.
    pub fn guard<C: Recoverable>(&self, target: &mut C, handler: impl FnOnce(&mut C)) {
        if let Err(fault) = self.run(|| handler(target)) {
            target.record_fault(fault);
        }

        let Err(fault) = self.run(|| target.finish()) else {
            return;
        };
        target.record_fault(fault);
        target.discard_payload();

        if self.run(|| target.finish()).is_ok() {
            return;
        }
        tracing::error!(parent: &self.span, "Response send faulted twice, sending literal fallback");
        if self.run(|| target.finish_literal()).is_err() {
            tracing::error!(parent: &self.span, "Literal fallback faulted; response is lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, EnvelopeEncoder, EnvelopeOptions, ERR_TYPE_ISE, FALLBACK_BODY};
    use crate::http::commit::CommitHook;
    use crate::http::sink::BufferedSink;
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;

    fn builder(debug: bool) -> EnvelopeBuilder<BufferedSink> {
        let options = EnvelopeOptions {
            debug,
            ..EnvelopeOptions::default()
        };
        EnvelopeBuilder::new(BufferedSink::new(Span::none()), options, Span::none())
    }

    fn sent(builder: EnvelopeBuilder<BufferedSink>) -> (StatusCode, Value) {
        let sink = builder.into_sink();
        (
            sink.status().unwrap(),
            serde_json::from_slice(sink.body()).unwrap(),
        )
    }

    #[test]
    fn test_run_passes_value_through() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        assert_eq!(boundary.run(|| 41 + 1).unwrap(), 42);
    }

    #[test]
    fn test_panic_becomes_ise_with_trace_in_debug() {
        let boundary = RecoveryBoundary::new(true, Span::none());
        let mut envelope = builder(true);

        boundary.guard(&mut envelope, |envelope| {
            envelope.payload("partial");
            panic!("handler exploded");
        });

        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["meta"]["ise"], true);
        let error = &body["meta"]["errors"][0];
        assert_eq!(error["type"], ERR_TYPE_ISE);
        assert_eq!(error["desc"], "handler exploded");
        assert!(error["trace"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn test_panic_without_debug_has_no_trace() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |_| panic!("handler exploded"));

        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["meta"]["errors"][0].get("trace").is_none());
    }

    #[test]
    fn test_handler_that_sent_is_not_sent_again() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |envelope| {
            envelope.send(Some(StatusCode::ACCEPTED)).unwrap();
        });

        let (status, _) = sent(envelope);
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[test]
    fn test_panic_after_send_keeps_committed_response() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |envelope| {
            envelope.send(None).unwrap();
            panic!("too late");
        });

        assert!(envelope.meta().ise);
        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["ise"], false);
    }

    struct Explodes;

    impl serde::Serialize for Explodes {
        fn serialize<Ser: serde::Serializer>(&self, _: Ser) -> Result<Ser::Ok, Ser::Error> {
            panic!("payload exploded");
        }
    }

    struct PanickingEncoder;

    impl EnvelopeEncoder for PanickingEncoder {
        fn encode(&self, _: &Envelope<'_>) -> serde_json::Result<Vec<u8>> {
            panic!("encoder exploded");
        }
    }

    #[test]
    fn test_fault_inside_handler_send_still_responds() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |envelope| {
            envelope.payload(Explodes);
            let _ = envelope.send(None);
        });

        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["meta"]["ise"], true);
        assert_eq!(body["meta"]["errors"][0]["desc"], "payload exploded");
        assert_eq!(body["payload"], Value::Null);
    }

    #[test]
    fn test_fault_inside_final_send_retries_without_payload() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |envelope| envelope.payload(Explodes));

        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let errors = body["meta"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["type"], ERR_TYPE_ISE);
        assert_eq!(errors[0]["desc"], "payload exploded");
        assert_eq!(body["payload"], Value::Null);
    }

    #[test]
    fn test_panicking_commit_action_still_responds() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let hook = CommitHook::new(BufferedSink::new(Span::none()), |_| panic!("cookie jar on fire"));
        let mut envelope = EnvelopeBuilder::new(hook, EnvelopeOptions::default(), Span::none());

        boundary.guard(&mut envelope, |envelope| {
            envelope.payload("fine");
            let _ = envelope.send(None);
        });

        let sink = envelope.into_sink().into_inner();
        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body: Value = serde_json::from_slice(sink.body()).unwrap();
        assert_eq!(body["meta"]["errors"][0]["desc"], "cookie jar on fire");
    }

    #[test]
    fn test_repeated_send_fault_commits_literal_fallback() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let options = EnvelopeOptions {
            debug: false,
            encoder: Arc::new(PanickingEncoder),
        };
        let mut envelope = EnvelopeBuilder::new(BufferedSink::new(Span::none()), options, Span::none());

        boundary.guard(&mut envelope, |envelope| envelope.payload("fine"));

        assert!(envelope.is_sent());
        let sink = envelope.into_sink();
        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sink.body(), FALLBACK_BODY);
    }

    #[test]
    fn test_handler_that_did_not_send_gets_default_send() {
        let boundary = RecoveryBoundary::new(false, Span::none());
        let mut envelope = builder(false);

        boundary.guard(&mut envelope, |envelope| envelope.payload(vec![1, 2, 3]));

        let (status, body) = sent(envelope);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"], serde_json::json!([1, 2, 3]));
    }
}
