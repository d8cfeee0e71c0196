use derive_more::{Display, Error};
use error_stack::Report;

use crate::model::SourceId;

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error, PartialEq)]
pub enum FetchError {
    #[display("{provider}: missing credential {var}")]
    MissingCredential { provider: SourceId, var: String },
    #[display("{provider} returned HTTP {status}")]
    Provider { provider: SourceId, status: u16 },
    #[display("request to {provider} failed")]
    Request { provider: SourceId },
    #[display("malformed response from {provider}")]
    MalformedResponse { provider: SourceId },
    #[display("unknown source: {name}")]
    UnknownSource { name: String },
    #[display("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[display("{provider} timed out after {millis}ms")]
    Timeout { provider: SourceId, millis: u64 },
    #[display("all providers failed")]
    AllProvidersFailed,
}

#[derive(Debug, Display, Error)]
pub enum CacheError {
    #[display("cache file i/o failed")]
    Io,
    #[display("failed to decode cached bars")]
    Decode,
    #[display("failed to encode bars for cache")]
    Encode,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ChartError {
    #[display("right pad {pad} outside [0, {max}]")]
    RightPadOutOfRange { pad: u32, max: u32 },
}

#[derive(Debug, Display, Error)]
pub enum StreamError {
    #[display("live feed connection to {url} failed")]
    Connection { url: String },
}

/// Joins every `FetchError` in the report chain, outermost first.
pub fn describe(report: &Report<FetchError>) -> String {
    report
        .frames()
        .filter_map(|frame| frame.downcast_ref::<FetchError>())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_underlying_error_after_context() {
        let report = Report::new(FetchError::Provider {
            provider: SourceId::Yahoo,
            status: 404,
        })
        .change_context(FetchError::AllProvidersFailed);

        assert_eq!(
            describe(&report),
            "all providers failed: yahoo returned HTTP 404"
        );
    }

    #[test]
    fn describe_single_context() {
        let report = Report::new(FetchError::UnknownSource {
            name: "kraken".into(),
        });
        assert_eq!(describe(&report), "unknown source: kraken");
    }
}
