//! Embedding vectors, their text encoding, and the distance used for matching.
//!
//! The text form is the one stored in the identity catalog and sent by
//! camera devices:
//!
//! ```text
//! vector := ws "[" ws number ( ws "," ws number )* ws "]" ws
//! ```
//!
//! Every `number` must parse as a finite float. The empty vector `[]` is
//! rejected. Encoding uses the shortest round-trip float formatting, so
//! `Embedding::parse(&v.encode())` reproduces `v` exactly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FaceIdError;

/// A point in face-feature space.
#[derive(Clone, PartialEq)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    /// Wraps components, rejecting empty vectors and non-finite values.
    pub fn new(components: Vec<f64>) -> Result<Self, FaceIdError> {
        let emb = Self(components);
        emb.validate()?;
        Ok(emb)
    }

    /// Parses the bracketed, comma-separated text form.
    pub fn parse(text: &str) -> Result<Self, FaceIdError> {
        let body = text
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| FaceIdError::MalformedVector("missing [ ] delimiters".into()))?
            .trim();

        if body.is_empty() {
            return Err(FaceIdError::MalformedVector("empty vector".into()));
        }

        let mut components = Vec::new();
        for (i, token) in body.split(',').enumerate() {
            let token = token.trim();
            let value: f64 = token.parse().map_err(|_| {
                FaceIdError::MalformedVector(format!("component {i}: {token:?} is not a number"))
            })?;
            components.push(value);
        }
        Self::new(components)
    }

    /// Returns the text form, e.g. `[0.05,0.05]`.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Checks the invariants every comparable vector must hold.
    pub fn validate(&self) -> Result<(), FaceIdError> {
        if self.0.is_empty() {
            return Err(FaceIdError::MalformedVector("empty vector".into()));
        }
        if let Some(i) = self.0.iter().position(|x| !x.is_finite()) {
            return Err(FaceIdError::MalformedVector(format!(
                "component {i} is not finite: {}",
                self.0[i]
            )));
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl fmt::Display for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, x) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            // Debug keeps a trailing ".0" and switches to exponent form for
            // very large/small magnitudes; both round-trip through parse.
            write!(f, "{x:?}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding").field("len", &self.0.len()).finish()
    }
}

impl FromStr for Embedding {
    type Err = FaceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Embedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Embedding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Outcome of comparing a detection against one prototype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// Both vectors have the same length; L2 distance between them.
    Distance(f64),

    /// Lengths differ. The pair is excluded from matching, not an error.
    LengthMismatch { left: usize, right: usize },
}

/// Euclidean (L2) distance between `a` and `b`.
///
/// A NaN result is reported as [`FaceIdError::MalformedVector`] so it can
/// never win a minimum search.
pub fn euclidean(a: &Embedding, b: &Embedding) -> Result<Comparison, FaceIdError> {
    if a.len() != b.len() {
        return Ok(Comparison::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let sum: f64 = a
        .0
        .iter()
        .zip(b.0.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    let d = sum.sqrt();
    if d.is_nan() {
        return Err(FaceIdError::MalformedVector("distance is NaN".into()));
    }
    Ok(Comparison::Distance(d))
}

/// Running average of `n` prior observations summarized by `centroid`
/// with one new observation `v`: `(n * centroid + v) / (n + 1)`.
///
/// Each component is computed as `c * (n / (n + 1)) + x / (n + 1)`, which
/// stays finite for finite inputs. A non-finite result is still rejected
/// with [`FaceIdError::MalformedVector`] so it never reaches a catalog.
///
/// `centroid` and `v` must have equal length.
pub fn running_average(
    centroid: &Embedding,
    n: u64,
    v: &Embedding,
) -> Result<Embedding, FaceIdError> {
    if centroid.len() != v.len() {
        return Err(FaceIdError::MalformedVector(format!(
            "cannot average vectors of length {} and {}",
            centroid.len(),
            v.len()
        )));
    }
    let n = n as f64;
    let keep = n / (n + 1.0);
    let components = centroid
        .0
        .iter()
        .zip(v.0.iter())
        .map(|(c, x)| c * keep + x / (n + 1.0))
        .collect();
    Embedding::new(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f64]) -> Embedding {
        Embedding::new(v.to_vec()).unwrap()
    }

    #[test]
    fn parse_basic() {
        let e = Embedding::parse("[1.0,2.5,-3]").unwrap();
        assert_eq!(e.as_slice(), &[1.0, 2.5, -3.0]);
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let e = Embedding::parse("  [ 0.1 , 0.2,0.3 ]\n").unwrap();
        assert_eq!(e.as_slice(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn parse_rejects_missing_delimiters() {
        assert!(matches!(
            Embedding::parse("1.0,2.0"),
            Err(FaceIdError::MalformedVector(_))
        ));
        assert!(matches!(
            Embedding::parse("[1.0,2.0"),
            Err(FaceIdError::MalformedVector(_))
        ));
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(matches!(
            Embedding::parse("[]"),
            Err(FaceIdError::MalformedVector(_))
        ));
        assert!(matches!(
            Embedding::parse("[   ]"),
            Err(FaceIdError::MalformedVector(_))
        ));
    }

    #[test]
    fn parse_rejects_non_numeric() {
        let err = Embedding::parse("[0.1,abc,0.3]").unwrap_err();
        assert!(err.to_string().contains("component 1"), "got {err}");
        assert!(Embedding::parse("[0.1,,0.3]").is_err());
        assert!(Embedding::parse("[0.1 0.2]").is_err());
    }

    #[test]
    fn parse_rejects_non_finite() {
        assert!(Embedding::parse("[NaN,1.0]").is_err());
        assert!(Embedding::parse("[inf,1.0]").is_err());
    }

    #[test]
    fn encode_is_lossless() {
        let e = emb(&[0.1, 1.0 / 3.0, -2.5e-12, 1e300, 42.0]);
        let text = e.encode();
        assert_eq!(Embedding::parse(&text).unwrap(), e);
        assert!(text.starts_with("[0.1,"));
    }

    #[test]
    fn serde_uses_text_form() {
        let e = emb(&[0.5, 1.0]);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"[0.5,1.0]\"");
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert!(serde_json::from_str::<Embedding>("\"[x]\"").is_err());
    }

    #[test]
    fn euclidean_distance() {
        let d = euclidean(&emb(&[0.0, 0.0]), &emb(&[3.0, 4.0])).unwrap();
        assert_eq!(d, Comparison::Distance(5.0));
    }

    #[test]
    fn euclidean_length_mismatch_is_skip() {
        let c = euclidean(&emb(&[0.0, 0.0]), &emb(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(c, Comparison::LengthMismatch { left: 2, right: 3 });
    }

    #[test]
    fn euclidean_nan_is_error() {
        // Bypasses the constructor to simulate a corrupted prototype.
        let bad = Embedding(vec![f64::NAN, 0.0]);
        assert!(matches!(
            euclidean(&bad, &emb(&[0.0, 0.0])),
            Err(FaceIdError::MalformedVector(_))
        ));
    }

    #[test]
    fn running_average_formula() {
        let c = emb(&[1.0, 2.0]);
        let v = emb(&[4.0, 8.0]);
        let avg = running_average(&c, 2, &v).unwrap();
        // (2*1 + 4)/3 = 2, (2*2 + 8)/3 = 4
        assert!((avg.as_slice()[0] - 2.0).abs() < 1e-9);
        assert!((avg.as_slice()[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn running_average_near_f64_max_stays_finite() {
        let big = emb(&[f64::MAX, -f64::MAX]);
        let avg = running_average(&big, 1, &big).unwrap();
        assert_eq!(avg.as_slice(), &[f64::MAX, -f64::MAX]);
        assert_eq!(Embedding::parse(&avg.encode()).unwrap(), avg);

        let avg = running_average(&emb(&[1e308, 0.0]), 1_000_000, &emb(&[1e308, 1.0])).unwrap();
        assert!(avg.as_slice().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn running_average_length_mismatch_is_error() {
        assert!(matches!(
            running_average(&emb(&[0.0]), 1, &emb(&[0.0, 1.0])),
            Err(FaceIdError::MalformedVector(_))
        ));
    }
}
