use snafu::Snafu;

/// The public error type for this crate.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

/// The public result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal result type, used before errors are wrapped for the public API.
pub(crate) type LibResult<T> = std::result::Result<T, LibError>;

/// The internal error enum. Variant names follow the error-kind vocabulary of
/// the spec's error handling design, not the type names of any one backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))]
pub(crate) enum LibError {
    /// MThd missing, wrong length, unsupported SMF format, SMPTE division,
    /// malformed chunk header.
    #[snafu(display("{}: bad SMF format: {}", site, description))]
    BadFormat { site: String, description: String },

    /// A varinum exceeded 4 bytes or the value `0x0FFFFFFF`.
    #[snafu(display("{}: bad variable-length quantity: {}", site, description))]
    BadVarinum { site: String, description: String },

    /// Buffer exhausted mid-event.
    #[snafu(display("{}: truncated data: {}", site, description))]
    Truncated { site: String, description: String },

    /// A data byte arrived before any status byte and the active track's
    /// recovery policy was `RunningStatusPolicy::Abort`.
    #[snafu(display("{}: running status fault: {}", site, description))]
    RunningStatusFault { site: String, description: String },

    /// A native backend (ALSA/JACK/CoreMIDI/WinMM/WebMIDI) reported failure.
    #[snafu(display("{}: backend error ({}): {}", site, backend, description))]
    BackendError {
        site: String,
        backend: String,
        description: String,
    },

    /// The backend enumerated zero ports; a warning, not a hard failure.
    #[snafu(display("{}: no MIDI devices found", site))]
    NoDevices { site: String },

    /// A port index or other index-like parameter was out of range.
    #[snafu(display("{}: invalid parameter: {}", site, description))]
    InvalidParameter { site: String, description: String },

    /// The current backend does not support the requested operation.
    #[snafu(display("{}: unimplemented on this backend: {}", site, description))]
    Unimplemented { site: String, description: String },

    /// Allocation or buffer failure inside a backend.
    #[snafu(display("{}: memory error: {}", site, description))]
    MemoryError { site: String, description: String },

    #[snafu(display("{}: unknown error", site))]
    Other { site: String },
}

/// Tags an error with `file:line` of the call site.
macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

/// Builds and returns a `BadFormat` error.
macro_rules! bad_format {
    ($($arg:tt)+) => {
        return crate::error::BadFormat { site: site!(), description: format!($($arg)+) }.fail()
    };
}

/// Builds and returns a `Truncated` error.
macro_rules! truncated {
    ($($arg:tt)+) => {
        return crate::error::Truncated { site: site!(), description: format!($($arg)+) }.fail()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_contains_file_and_line() {
        let line = line!() + 1;
        let site = site!();
        assert!(site.contains("error.rs"));
        assert!(site.contains(&format!("{}", line)));
    }

    #[test]
    fn bad_format_macro_formats_message() {
        fn fails() -> LibResult<u64> {
            bad_format!("track {} missing MThd", 3);
        }
        let err = fails().unwrap_err();
        assert!(format!("{}", err).contains("track 3 missing MThd"));
    }

    #[test]
    fn public_error_wraps_internal_error() {
        fn inner() -> LibResult<()> {
            crate::error::NoDevices { site: site!() }.fail()
        }
        fn outer() -> Result<()> {
            Ok(inner()?)
        }
        let err = outer().unwrap_err();
        assert!(format!("{}", err).contains("no MIDI devices"));
    }
}
