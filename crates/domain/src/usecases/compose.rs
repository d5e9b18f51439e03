//! Compose use case - renders a lot into post text and an image location

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::model::{ComposedPost, FieldValue, Lot};

/// Default template for both status text and image search
pub const DEFAULT_FORMAT: &str = "{address}";

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("valid token regex"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?::\.(\d+)f?)?$").expect("valid placeholder regex")
});

/// Errors raised while composing a post
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComposeError {
    #[error("Template references field '{field}' which lot {lot_id} does not have")]
    MissingField { field: String, lot_id: String },
    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error("Lot {0} has neither an address nor coordinates")]
    NoLocation(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field {
        name: String,
        precision: Option<usize>,
    },
}

/// A parsed template with `{field}` placeholders.
///
/// `{{` and `}}` produce literal braces and `{field:.N}` rounds numeric
/// values to N decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ComposeError> {
        let invalid = |reason: String| ComposeError::InvalidTemplate {
            template: source.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in TOKEN.captures_iter(source) {
            let token = caps.get(0).expect("match 0 always present");
            literal.push_str(&source[last..token.start()]);
            last = token.end();

            match token.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                "{" | "}" => {
                    return Err(invalid(format!("unbalanced brace at byte {}", token.start())));
                }
                _ => {
                    let inner = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                    let placeholder = PLACEHOLDER.captures(inner).ok_or_else(|| {
                        invalid(format!("unsupported placeholder '{{{}}}'", inner))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field {
                        name: placeholder[1].to_string(),
                        precision: placeholder.get(2).and_then(|p| p.as_str().parse().ok()),
                    });
                }
            }
        }

        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of all fields the template references
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute fields; any unknown field is an error, never blanked
    pub fn render(
        &self,
        fields: &BTreeMap<String, FieldValue>,
        lot_id: &str,
    ) -> Result<String, ComposeError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, precision } => {
                    let value = fields.get(name).ok_or_else(|| ComposeError::MissingField {
                        field: name.clone(),
                        lot_id: lot_id.to_string(),
                    })?;
                    match (precision, value.as_f64()) {
                        (Some(p), Some(n)) if !matches!(value, FieldValue::Text(_)) => {
                            out.push_str(&format!("{:.*}", *p, n))
                        }
                        _ => out.push_str(&value.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Trim surrounding whitespace; applying it twice equals applying it once
pub fn sanitize_address(address: &str) -> String {
    address.trim().to_string()
}

/// Configuration for the composer
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Template for the post status text
    pub print_format: String,
    /// Template for the image location query
    pub search_format: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            print_format: DEFAULT_FORMAT.to_string(),
            search_format: DEFAULT_FORMAT.to_string(),
        }
    }
}

/// Renders lots into post content
#[derive(Debug, Clone)]
pub struct Composer {
    print: Template,
    search: Template,
}

impl Composer {
    /// Parse both templates up front so a bad template fails before any I/O
    pub fn new(config: &ComposeConfig) -> Result<Self, ComposeError> {
        Ok(Self {
            print: Template::parse(&config.print_format)?,
            search: Template::parse(&config.search_format)?,
        })
    }

    pub fn compose(&self, lot: &Lot) -> Result<ComposedPost, ComposeError> {
        let fields = template_fields(lot);
        let status = self.print.render(&fields, &lot.id)?;
        let address = sanitize_address(&lot.address);

        let alt_text = if address.is_empty() {
            format!("Parcel {}", lot.id)
        } else {
            address
        };

        Ok(ComposedPost {
            lot_id: lot.id.clone(),
            status,
            lat: lot.lat,
            lon: lot.lon,
            alt_text,
        })
    }

    /// Location string for image acquisition.
    ///
    /// Uses the search template when the lot has an address, falls back to
    /// `lat,lon`, and fails when neither is available.
    pub fn image_location(&self, lot: &Lot) -> Result<String, ComposeError> {
        if !sanitize_address(&lot.address).is_empty() {
            return self.search.render(&template_fields(lot), &lot.id);
        }

        if lot.has_coordinates() {
            tracing::warn!(
                lot_id = %lot.id,
                lat = lot.lat,
                lon = lot.lon,
                "Using lat/lon for location"
            );
            return Ok(format!("{},{}", lot.lat, lot.lon));
        }

        Err(ComposeError::NoLocation(lot.id.clone()))
    }
}

/// Every field a template may reference, with the address already sanitized
fn template_fields(lot: &Lot) -> BTreeMap<String, FieldValue> {
    let mut fields = lot.extra.clone();
    fields.insert("id".to_string(), FieldValue::Text(lot.id.clone()));
    fields.insert(
        "address".to_string(),
        FieldValue::Text(sanitize_address(&lot.address)),
    );
    fields.insert("lat".to_string(), FieldValue::Real(lot.lat));
    fields.insert("lon".to_string(), FieldValue::Real(lot.lon));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lot() -> Lot {
        Lot::new("65.34-2-1", "  12 Lark St, Albany, NY 12210 ", 42.6587, -73.7776)
            .with_field("floors", FieldValue::Integer(3))
    }

    fn composer(print: &str, search: &str) -> Composer {
        Composer::new(&ComposeConfig {
            print_format: print.to_string(),
            search_format: search.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_address("  12 Lark St \n");
        assert_eq!(once, "12 Lark St");
        assert_eq!(sanitize_address(&once), once);
    }

    #[test]
    fn test_compose_uses_sanitized_address() {
        let post = Composer::new(&ComposeConfig::default())
            .unwrap()
            .compose(&sample_lot())
            .unwrap();

        assert_eq!(post.status, "12 Lark St, Albany, NY 12210");
        assert_eq!(post.alt_text, "12 Lark St, Albany, NY 12210");
        assert_eq!(post.lot_id, "65.34-2-1");
        assert_eq!(post.lat, 42.6587);
        assert_eq!(post.lon, -73.7776);
    }

    #[test]
    fn test_compose_binds_other_fields() {
        let post = composer("{address} ({floors} floors) #{id}", DEFAULT_FORMAT)
            .compose(&sample_lot())
            .unwrap();

        assert_eq!(post.status, "12 Lark St, Albany, NY 12210 (3 floors) #65.34-2-1");
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let result = composer("{address} in {ward}", DEFAULT_FORMAT).compose(&sample_lot());

        assert_eq!(
            result,
            Err(ComposeError::MissingField {
                field: "ward".to_string(),
                lot_id: "65.34-2-1".to_string(),
            })
        );
    }

    #[test]
    fn test_escaped_braces_and_precision() {
        let post = composer("{{{address}}} @ {lat:.2},{lon:.2f}", DEFAULT_FORMAT)
            .compose(&sample_lot())
            .unwrap();

        assert_eq!(post.status, "{12 Lark St, Albany, NY 12210} @ 42.66,-73.78");
    }

    #[test]
    fn test_unbalanced_template_rejected() {
        for bad in ["{address", "address}", "{}", "{address!r}"] {
            let result = Composer::new(&ComposeConfig {
                print_format: bad.to_string(),
                ..Default::default()
            });
            assert!(
                matches!(result, Err(ComposeError::InvalidTemplate { .. })),
                "template {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_template_lists_fields() {
        let template = Template::parse("{address}, {city} {{x}}").unwrap();
        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["address", "city"]);
    }

    #[test]
    fn test_empty_address_alt_text_falls_back_to_id() {
        let lot = Lot::new("7", "   ", 42.0, -73.0);
        let post = composer("Lot {id}", DEFAULT_FORMAT).compose(&lot).unwrap();

        assert_eq!(post.status, "Lot 7");
        assert_eq!(post.alt_text, "Parcel 7");
    }

    #[test]
    fn test_image_location_prefers_search_template() {
        let location = composer(DEFAULT_FORMAT, "{address}, USA")
            .image_location(&sample_lot())
            .unwrap();

        assert_eq!(location, "12 Lark St, Albany, NY 12210, USA");
    }

    #[test]
    fn test_image_location_falls_back_to_coordinates() {
        let lot = Lot::new("7", "", 42.5, -73.25);
        let location = composer(DEFAULT_FORMAT, DEFAULT_FORMAT)
            .image_location(&lot)
            .unwrap();

        assert_eq!(location, "42.5,-73.25");
    }

    #[test]
    fn test_image_location_requires_address_or_coordinates() {
        let lot = Lot::new("7", "", 0.0, 0.0);
        let result = composer(DEFAULT_FORMAT, DEFAULT_FORMAT).image_location(&lot);

        assert_eq!(result, Err(ComposeError::NoLocation("7".to_string())));
    }
}
