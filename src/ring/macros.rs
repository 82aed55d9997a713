// Per-operation spans are too hot for normal builds; compile with
// RUSTFLAGS="--cfg enable_trace" to get them.
macro_rules! op_span {
    ($name:expr) => {
        #[cfg(enable_trace)]
        let _entered = tracing::span!(tracing::Level::TRACE, $name).entered();
    };
}
