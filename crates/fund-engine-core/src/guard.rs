use std::fmt;

use serde::ser;
use serde::{Deserialize, Serialize};

use crate::error::FundEngineError;
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Why a guarded value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardReason {
    NonFiniteNumber,
    TooDeep,
    TooBroad,
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardReason::NonFiniteNumber => "non-finite-number",
            GuardReason::TooDeep => "too-deep",
            GuardReason::TooBroad => "too-broad",
        })
    }
}

/// Traversal ceilings. Exceeding either is a distinct failure, never a
/// silent truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardLimits {
    pub max_depth: usize,
    pub max_breadth: usize,
}

impl Default for GuardLimits {
    fn default() -> Self {
        GuardLimits {
            max_depth: 64,
            max_breadth: 10_000,
        }
    }
}

/// Location and reason of the first violation found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardViolation {
    /// JSONPath-style locator, e.g. `$.yearly_breakdown[3].management_fee`
    pub path: String,
    pub reason: GuardReason,
}

/// Outcome of a guard scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<GuardViolation>,
}

/// Scan `value` for non-finite numbers and structural blow-ups.
///
/// The walk visits every primitive the value serializes, short-circuits
/// at the first `NaN`/`±inf` leaf, and enforces the depth and breadth
/// ceilings so adversarially nested inputs terminate in bounded time.
pub fn scan<T: Serialize>(value: &T, limits: &GuardLimits) -> FundEngineResult<GuardReport> {
    let mut probe = FiniteProbe::new(limits.clone());
    match value.serialize(&mut probe) {
        Ok(()) => Ok(GuardReport {
            ok: true,
            violation: None,
        }),
        Err(ProbeError::Violation(violation)) => Ok(GuardReport {
            ok: false,
            violation: Some(violation),
        }),
        Err(ProbeError::Message(msg)) => Err(FundEngineError::SerializationError(msg)),
    }
}

/// Mandatory last step before any engine output leaves the boundary:
/// error with the violation path if the value is not fully finite.
pub fn assert_finite<T: Serialize>(value: &T, limits: &GuardLimits) -> FundEngineResult<()> {
    match scan(value, limits)? {
        GuardReport { ok: true, .. } => Ok(()),
        GuardReport {
            violation: Some(v), ..
        } => Err(FundEngineError::NonFiniteResult {
            path: v.path,
            reason: v.reason,
        }),
        // scan never reports !ok without a violation
        GuardReport { .. } => Err(FundEngineError::SerializationError(
            "guard scan returned no violation detail".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Probe serializer
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ProbeError {
    Violation(GuardViolation),
    Message(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Violation(v) => write!(f, "{} at {}", v.reason, v.path),
            ProbeError::Message(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for ProbeError {}

impl ser::Error for ProbeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ProbeError::Message(msg.to_string())
    }
}

enum Segment {
    Field(&'static str),
    Key(String),
    Index(usize),
}

fn render_path(segments: &[Segment]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        match segment {
            Segment::Field(name) => {
                path.push('.');
                path.push_str(name);
            }
            Segment::Key(key) => {
                path.push('.');
                path.push_str(key);
            }
            Segment::Index(i) => {
                path.push('[');
                path.push_str(&i.to_string());
                path.push(']');
            }
        }
    }
    path
}

/// A serializer that checks rather than emits: primitives are inspected,
/// containers push a path segment per frame and count depth/breadth.
struct FiniteProbe {
    limits: GuardLimits,
    path: Vec<Segment>,
    depth: usize,
    pending_key: Option<String>,
}

impl FiniteProbe {
    fn new(limits: GuardLimits) -> Self {
        FiniteProbe {
            limits,
            path: Vec::new(),
            depth: 0,
            pending_key: None,
        }
    }

    fn violation(&self, reason: GuardReason) -> ProbeError {
        ProbeError::Violation(GuardViolation {
            path: render_path(&self.path),
            reason,
        })
    }

    fn check_float(&self, value: f64) -> Result<(), ProbeError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.violation(GuardReason::NonFiniteNumber))
        }
    }

    fn enter(&mut self) -> Result<(), ProbeError> {
        if self.depth >= self.limits.max_depth {
            return Err(self.violation(GuardReason::TooDeep));
        }
        self.depth += 1;
        Ok(())
    }
}

/// Container frame: owns the element counter and pops the variant
/// segment (if any) when the frame closes.
struct Frame<'a> {
    probe: &'a mut FiniteProbe,
    count: usize,
    variant: bool,
}

impl<'a> Frame<'a> {
    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        if self.count >= self.probe.limits.max_breadth {
            return Err(self.probe.violation(GuardReason::TooBroad));
        }
        self.probe.path.push(Segment::Index(self.count));
        let result = value.serialize(&mut *self.probe);
        self.probe.path.pop();
        self.count += 1;
        result
    }

    fn named<T: ?Sized + Serialize>(
        &mut self,
        segment: Segment,
        value: &T,
    ) -> Result<(), ProbeError> {
        if self.count >= self.probe.limits.max_breadth {
            return Err(self.probe.violation(GuardReason::TooBroad));
        }
        self.probe.path.push(segment);
        let result = value.serialize(&mut *self.probe);
        self.probe.path.pop();
        self.count += 1;
        result
    }

    fn finish(self) -> Result<(), ProbeError> {
        self.probe.depth -= 1;
        if self.variant {
            self.probe.path.pop();
        }
        Ok(())
    }
}

impl<'a> ser::Serializer for &'a mut FiniteProbe {
    type Ok = ();
    type Error = ProbeError;

    type SerializeSeq = Frame<'a>;
    type SerializeTuple = Frame<'a>;
    type SerializeTupleStruct = Frame<'a>;
    type SerializeTupleVariant = Frame<'a>;
    type SerializeMap = Frame<'a>;
    type SerializeStruct = Frame<'a>;
    type SerializeStructVariant = Frame<'a>;

    fn serialize_bool(self, _v: bool) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i128(self, _v: i128) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u128(self, _v: u128) -> Result<(), ProbeError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), ProbeError> {
        self.check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), ProbeError> {
        self.check_float(v)
    }

    fn serialize_char(self, _v: char) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), ProbeError> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), ProbeError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.path.push(Segment::Field(variant));
        let result = value.serialize(&mut *self);
        self.path.pop();
        result
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Frame<'a>, ProbeError> {
        self.enter()?;
        Ok(Frame {
            probe: self,
            count: 0,
            variant: false,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Frame<'a>, ProbeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Frame<'a>, ProbeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Frame<'a>, ProbeError> {
        self.path.push(Segment::Field(variant));
        self.enter()?;
        Ok(Frame {
            probe: self,
            count: 0,
            variant: true,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Frame<'a>, ProbeError> {
        self.enter()?;
        Ok(Frame {
            probe: self,
            count: 0,
            variant: false,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Frame<'a>, ProbeError> {
        self.enter()?;
        Ok(Frame {
            probe: self,
            count: 0,
            variant: false,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Frame<'a>, ProbeError> {
        self.path.push(Segment::Field(variant));
        self.enter()?;
        Ok(Frame {
            probe: self,
            count: 0,
            variant: true,
        })
    }
}

impl ser::SerializeSeq for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeTuple for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        self.element(value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeMap for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ProbeError> {
        // Keys carry no numeric payload of interest; render them for the
        // path locator of whatever the value reports.
        let rendered = match serde_json::to_value(key) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(e) => return Err(ProbeError::Message(e.to_string())),
        };
        self.probe.pending_key = Some(rendered);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        let key = self
            .probe
            .pending_key
            .take()
            .unwrap_or_else(|| "?".to_string());
        self.named(Segment::Key(key), value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeStruct for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.named(Segment::Field(key), value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for Frame<'_> {
    type Ok = ();
    type Error = ProbeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        self.named(Segment::Field(key), value)
    }

    fn end(self) -> Result<(), ProbeError> {
        self.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Flat {
        a: f64,
        b: f64,
    }

    #[derive(Serialize)]
    struct WithVec {
        a: Vec<f64>,
    }

    #[derive(Serialize)]
    struct Nested {
        yearly_breakdown: Vec<Year>,
    }

    #[derive(Serialize)]
    struct Year {
        year: u32,
        fee: f64,
    }

    #[test]
    fn test_finite_struct_passes() {
        let report = scan(&Flat { a: 1.0, b: 2.0 }, &GuardLimits::default()).unwrap();
        assert!(report.ok);
        assert!(report.violation.is_none());
    }

    #[test]
    fn test_nan_in_sequence_reports_path() {
        let value = WithVec {
            a: vec![1.0, 2.0, f64::NAN],
        };
        let report = scan(&value, &GuardLimits::default()).unwrap();
        assert!(!report.ok);
        let violation = report.violation.unwrap();
        assert_eq!(violation.path, "$.a[2]");
        assert_eq!(violation.reason, GuardReason::NonFiniteNumber);
    }

    #[test]
    fn test_infinity_in_nested_struct() {
        let value = Nested {
            yearly_breakdown: vec![
                Year { year: 1, fee: 2.0 },
                Year { year: 2, fee: 2.0 },
                Year { year: 3, fee: 2.0 },
                Year {
                    year: 4,
                    fee: f64::INFINITY,
                },
            ],
        };
        let violation = scan(&value, &GuardLimits::default())
            .unwrap()
            .violation
            .unwrap();
        assert_eq!(violation.path, "$.yearly_breakdown[3].fee");
        assert_eq!(violation.reason, GuardReason::NonFiniteNumber);
    }

    #[test]
    fn test_negative_infinity_detected() {
        let report = scan(
            &Flat {
                a: f64::NEG_INFINITY,
                b: 0.0,
            },
            &GuardLimits::default(),
        )
        .unwrap();
        assert_eq!(report.violation.unwrap().path, "$.a");
    }

    #[test]
    fn test_map_keys_appear_in_path() {
        let mut map: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        map.insert("alpha".into(), vec![1.0]);
        map.insert("beta".into(), vec![1.0, f64::NAN]);
        let violation = scan(&map, &GuardLimits::default())
            .unwrap()
            .violation
            .unwrap();
        assert_eq!(violation.path, "$.beta[1]");
    }

    #[test]
    fn test_depth_ceiling() {
        let mut value = serde_json::json!(1.0);
        for _ in 0..10 {
            value = serde_json::json!({ "inner": value });
        }
        let limits = GuardLimits {
            max_depth: 4,
            max_breadth: 100,
        };
        let violation = scan(&value, &limits).unwrap().violation.unwrap();
        assert_eq!(violation.reason, GuardReason::TooDeep);
        assert_eq!(violation.path, "$.inner.inner.inner.inner");
    }

    #[test]
    fn test_breadth_ceiling() {
        let wide: Vec<u32> = (0..100).collect();
        let limits = GuardLimits {
            max_depth: 4,
            max_breadth: 10,
        };
        let violation = scan(&wide, &limits).unwrap().violation.unwrap();
        assert_eq!(violation.reason, GuardReason::TooBroad);
    }

    #[test]
    fn test_decimal_always_finite() {
        // Decimal serializes as a string under serde-with-str and cannot
        // carry NaN; the guard passes it through.
        let report = scan(&dec!(123.456), &GuardLimits::default()).unwrap();
        assert!(report.ok);
    }

    #[test]
    fn test_assert_finite_maps_to_error() {
        let value = WithVec {
            a: vec![f64::NAN],
        };
        match assert_finite(&value, &GuardLimits::default()) {
            Err(FundEngineError::NonFiniteResult { path, reason }) => {
                assert_eq!(path, "$.a[0]");
                assert_eq!(reason, GuardReason::NonFiniteNumber);
            }
            other => panic!("expected NonFiniteResult, got {other:?}"),
        }
    }

    #[test]
    fn test_option_and_enum_traversal() {
        #[derive(Serialize)]
        enum Wrapped {
            Value { x: f64 },
        }
        #[derive(Serialize)]
        struct Holder {
            maybe: Option<Wrapped>,
        }
        let violation = scan(
            &Holder {
                maybe: Some(Wrapped::Value { x: f64::NAN }),
            },
            &GuardLimits::default(),
        )
        .unwrap()
        .violation
        .unwrap();
        assert_eq!(violation.path, "$.maybe.Value.x");
    }
}
