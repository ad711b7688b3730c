//! Logging shims: forward to `tracing` when the feature is on, compile to nothing otherwise.

#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($tt:tt)*) => { tracing::trace!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($tt:tt)*) => { tracing::debug!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {};
}

// `warn` alone would clash with the built-in lint attribute on re-export.
#[cfg(feature = "tracing")]
macro_rules! warn_ {
    ($($tt:tt)*) => { tracing::warn!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_ {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! error {
    ($($tt:tt)*) => { tracing::error!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($tt:tt)*) => {};
}

pub(crate) use {debug, error, trace, warn_ as warn};
