//! # Innate Primitives
//!
//! Hardcoded constants for the Topica engine.
//!
//! These values are compiled into the binary. The ones that callers may
//! want to change (default name type, nesting limit) are only defaults for
//! [`IngestConfig`](crate::ingestor::IngestConfig).

/// Subject identifier of the default name type.
///
/// A name without an explicit type is typed with the topic carrying this
/// subject identifier. The topic is created on first use.
pub const DEFAULT_NAME_TYPE: &str = "http://psi.topicmaps.org/iso13250/model/topic-name";

/// Datatype of plain string literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Datatype of IRI literals.
pub const XSD_ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";

/// Default maximum nesting depth of an event stream.
///
/// The deepest well-formed path is
/// INITIAL > TOPIC > NAME > VARIANT > SCOPE > THEME, so real streams never
/// get close. The limit bounds the construct stack against hostile input.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum size of an event file accepted by the CLI (100 MB).
pub const MAX_STREAM_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_limit_covers_deepest_path() {
        // INITIAL, TOPIC, NAME, VARIANT, SCOPE, THEME
        assert!(MAX_NESTING_DEPTH >= 6);
    }

    #[test]
    fn xsd_datatypes_share_namespace() {
        assert!(XSD_STRING.starts_with("http://www.w3.org/2001/XMLSchema#"));
        assert!(XSD_ANY_URI.starts_with("http://www.w3.org/2001/XMLSchema#"));
    }
}
