//! Cache keys.

use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue};

/// Cache key: fragment URL plus the values of the configured vary request
/// headers, sorted by header name. Equal fingerprints share one cache entry
/// and one in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    src: String,
    vary: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl Fingerprint {
    pub fn new(src: &str, request_headers: &HeaderMap, vary_by: &[HeaderName]) -> Self {
        let mut vary: Vec<(HeaderName, Vec<HeaderValue>)> = vary_by
            .iter()
            .filter_map(|name| {
                let values: Vec<HeaderValue> =
                    request_headers.get_all(name).iter().cloned().collect();
                (!values.is_empty()).then(|| (name.clone(), values))
            })
            .collect();
        vary.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        vary.dedup_by(|(a, _), (b, _)| a == b);

        Self {
            src: src.to_string(),
            vary,
        }
    }

    /// Bytes held by the key, counted against cache capacity.
    pub fn size_bytes(&self) -> usize {
        self.src.len()
            + self
                .vary
                .iter()
                .map(|(name, values)| {
                    name.as_str().len() + values.iter().map(HeaderValue::len).sum::<usize>()
                })
                .sum::<usize>()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.src)?;
        for (name, values) in &self.vary {
            write!(f, "|{name}=")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                f.write_str(&String::from_utf8_lossy(value.as_bytes()))?;
            }
        }
        Ok(())
    }
}
