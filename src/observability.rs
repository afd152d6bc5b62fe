use biometrics::{Collector, Counter, Moments};

pub(crate) static TRANSPORT_REQUESTS: Counter = Counter::new("colloquy.transport.requests");
pub(crate) static TRANSPORT_REQUEST_ERRORS: Counter =
    Counter::new("colloquy.transport.request_errors");
pub(crate) static TRANSPORT_REQUEST_DURATION: Moments =
    Moments::new("colloquy.transport.request_duration_seconds");
pub(crate) static TRANSPORT_STREAM_BYTES: Counter = Counter::new("colloquy.transport.stream_bytes");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("colloquy.stream.chunks");
pub(crate) static STREAM_DECODE_ERRORS: Counter = Counter::new("colloquy.stream.decode_errors");
pub(crate) static STREAM_TTFT: Moments = Moments::new("colloquy.stream.ttft_seconds");

pub(crate) static SESSION_TURNS: Counter = Counter::new("colloquy.session.turns");
pub(crate) static SESSION_TURN_FAILURES: Counter = Counter::new("colloquy.session.turn_failures");
pub(crate) static SESSION_TURN_INTERRUPTS: Counter =
    Counter::new("colloquy.session.turn_interrupts");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("colloquy.session.turn_duration_seconds");

pub(crate) static RETRIEVAL_CALLS: Counter = Counter::new("colloquy.retrieval.calls");
pub(crate) static RETRIEVAL_ERRORS: Counter = Counter::new("colloquy.retrieval.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TRANSPORT_REQUESTS);
    collector.register_counter(&TRANSPORT_REQUEST_ERRORS);
    collector.register_moments(&TRANSPORT_REQUEST_DURATION);
    collector.register_counter(&TRANSPORT_STREAM_BYTES);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_DECODE_ERRORS);
    collector.register_moments(&STREAM_TTFT);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_TURN_FAILURES);
    collector.register_counter(&SESSION_TURN_INTERRUPTS);
    collector.register_moments(&SESSION_TURN_DURATION);

    collector.register_counter(&RETRIEVAL_CALLS);
    collector.register_counter(&RETRIEVAL_ERRORS);
}
