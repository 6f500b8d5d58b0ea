//! The per-run host heap holding strings, arrays and errors.
//!
//! Handles are `index + 1`; handle `0` is what an unassigned reference
//! variable holds and faults on every use.

use std::collections::HashMap;

use kata_types::abi;

use crate::fault::Fault;
use crate::format::format_number;

/// An array slot. Numbers are stored as `f64`; booleans and references as
/// their `i32` representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Elem {
    Num(f64),
    Ref(i32),
}

impl Elem {
    pub fn as_f64(self) -> f64 {
        match self {
            Elem::Num(n) => n,
            Elem::Ref(r) => f64::from(r),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Elem::Num(n) => n as i32,
            Elem::Ref(r) => r,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrayObject {
    /// Element kind code from the host ABI.
    pub kind: i32,
    pub items: Vec<Elem>,
}

#[derive(Debug, Clone)]
pub enum Object {
    Str(String),
    Array(ArrayObject),
    /// An `Error` and the handle of its message.
    Error { message: i32 },
}

/// Bytes charged for one array slot.
pub const ELEM_BYTES: usize = std::mem::size_of::<Elem>();

/// Objects allocated by one run. Dropped with the run's store.
///
/// Nothing is freed before the run ends, so every string and array slot
/// ever allocated counts against `max_bytes`.
#[derive(Debug)]
pub struct Heap {
    objects: Vec<Object>,
    /// Literal `(offset, length)` → handle; strings are immutable so one
    /// handle per literal is enough.
    literals: HashMap<(u32, u32), i32>,
    max_objects: usize,
    max_string_bytes: usize,
    bytes: usize,
    max_bytes: usize,
}

impl Heap {
    pub fn new(max_objects: usize, max_string_bytes: usize, max_bytes: usize) -> Self {
        Self {
            objects: Vec::new(),
            literals: HashMap::new(),
            max_objects,
            max_string_bytes,
            bytes: 0,
            max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// String and array-slot bytes allocated so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Account for `bytes` more data, or fault if the run would exceed its
    /// memory limit.
    pub fn charge(&mut self, bytes: usize) -> Result<(), Fault> {
        match self.bytes.checked_add(bytes) {
            Some(total) if total <= self.max_bytes => {
                self.bytes = total;
                Ok(())
            }
            _ => Err(Fault::MemoryLimit {
                limit: self.max_bytes,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn alloc(&mut self, object: Object) -> Result<i32, Fault> {
        if self.objects.len() >= self.max_objects {
            return Err(Fault::HeapLimit {
                limit: self.max_objects,
            });
        }
        self.objects.push(object);
        i32::try_from(self.objects.len()).map_err(|_| Fault::HeapLimit {
            limit: self.max_objects,
        })
    }

    fn get(&self, handle: i32) -> Result<&Object, Fault> {
        if handle == 0 {
            return Err(Fault::Uninitialized);
        }
        usize::try_from(handle - 1)
            .ok()
            .and_then(|i| self.objects.get(i))
            .ok_or_else(|| Fault::Internal(format!("dangling handle {handle}")))
    }

    fn get_mut(&mut self, handle: i32) -> Result<&mut Object, Fault> {
        if handle == 0 {
            return Err(Fault::Uninitialized);
        }
        usize::try_from(handle - 1)
            .ok()
            .and_then(|i| self.objects.get_mut(i))
            .ok_or_else(|| Fault::Internal(format!("dangling handle {handle}")))
    }

    // ── Strings ──────────────────────────────────────────────────────────

    pub fn alloc_str(&mut self, s: String) -> Result<i32, Fault> {
        if s.len() > self.max_string_bytes {
            return Err(Fault::RangeError("Invalid string length".into()));
        }
        self.charge(s.len())?;
        self.alloc(Object::Str(s))
    }

    /// The handle already allocated for the literal at `(offset, len)`.
    pub fn cached_literal(&self, offset: u32, len: u32) -> Option<i32> {
        self.literals.get(&(offset, len)).copied()
    }

    /// Allocate a literal's text and remember its handle.
    pub fn intern_literal(&mut self, offset: u32, len: u32, text: String) -> Result<i32, Fault> {
        let handle = self.alloc_str(text)?;
        self.literals.insert((offset, len), handle);
        Ok(handle)
    }

    pub fn str(&self, handle: i32) -> Result<&str, Fault> {
        match self.get(handle)? {
            Object::Str(s) => Ok(s),
            _ => Err(kind_mismatch(handle, "string")),
        }
    }

    // ── Arrays ───────────────────────────────────────────────────────────

    pub fn alloc_array(&mut self, kind: i32, items: Vec<Elem>) -> Result<i32, Fault> {
        self.charge(items.len().saturating_mul(ELEM_BYTES))?;
        self.alloc(Object::Array(ArrayObject { kind, items }))
    }

    pub fn array(&self, handle: i32) -> Result<&ArrayObject, Fault> {
        match self.get(handle)? {
            Object::Array(a) => Ok(a),
            _ => Err(kind_mismatch(handle, "array")),
        }
    }

    pub fn array_mut(&mut self, handle: i32) -> Result<&mut ArrayObject, Fault> {
        match self.get_mut(handle)? {
            Object::Array(a) => Ok(a),
            _ => Err(kind_mismatch(handle, "array")),
        }
    }

    // ── Errors ───────────────────────────────────────────────────────────

    pub fn alloc_error(&mut self, message: i32) -> Result<i32, Fault> {
        // Validate the message before it is stored.
        self.str(message)?;
        self.alloc(Object::Error { message })
    }

    /// The message handle of an error.
    pub fn error_message(&self, handle: i32) -> Result<i32, Fault> {
        match self.get(handle)? {
            Object::Error { message } => Ok(*message),
            _ => Err(kind_mismatch(handle, "Error")),
        }
    }

    // ── Conversions ──────────────────────────────────────────────────────

    /// `String(value)` for a value of element kind `kind`.
    pub fn to_js_string(&self, kind: i32, elem: Elem) -> Result<String, Fault> {
        Ok(match kind {
            abi::KIND_NUMBER => format_number(elem.as_f64()),
            abi::KIND_BOOLEAN => bool_str(elem.as_i32()).to_string(),
            abi::KIND_STRING => self.str(elem.as_i32())?.to_string(),
            abi::KIND_ARRAY => self.join(elem.as_i32(), ",")?,
            abi::KIND_ERROR => self.error_string(elem.as_i32())?,
            other => return Err(Fault::Internal(format!("unknown element kind {other}"))),
        })
    }

    /// `arr.join(sep)`.
    pub fn join(&self, handle: i32, separator: &str) -> Result<String, Fault> {
        let array = self.array(handle)?;
        let parts = array
            .items
            .iter()
            .map(|&e| self.to_js_string(array.kind, e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(separator))
    }

    /// `String(err)`: `Error: msg`, or `Error` for an empty message.
    pub fn error_string(&self, handle: i32) -> Result<String, Fault> {
        let message = self.str(self.error_message(handle)?)?;
        Ok(if message.is_empty() {
            "Error".to_string()
        } else {
            format!("Error: {message}")
        })
    }

    /// How `console.log` shows a value of element kind `kind`. Strings are
    /// quoted only when nested inside an array.
    pub fn inspect(&self, kind: i32, elem: Elem, nested: bool) -> Result<String, Fault> {
        Ok(match kind {
            abi::KIND_STRING if nested => quote(self.str(elem.as_i32())?),
            abi::KIND_ARRAY => {
                let array = self.array(elem.as_i32())?;
                if array.items.is_empty() {
                    "[]".to_string()
                } else {
                    let parts = array
                        .items
                        .iter()
                        .map(|&e| self.inspect(array.kind, e, true))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("[ {} ]", parts.join(", "))
                }
            }
            abi::KIND_ERROR if nested => format!("[{}]", self.error_string(elem.as_i32())?),
            _ => self.to_js_string(kind, elem)?,
        })
    }

    /// Element kind of a top-level reference handle.
    pub fn kind_of(&self, handle: i32) -> Result<i32, Fault> {
        Ok(match self.get(handle)? {
            Object::Str(_) => abi::KIND_STRING,
            Object::Array(_) => abi::KIND_ARRAY,
            Object::Error { .. } => abi::KIND_ERROR,
        })
    }

    /// `===` between two array elements of kind `kind`.
    pub fn strict_equals(&self, kind: i32, a: Elem, b: Elem) -> Result<bool, Fault> {
        Ok(match kind {
            abi::KIND_STRING => self.str(a.as_i32())? == self.str(b.as_i32())?,
            abi::KIND_NUMBER => a.as_f64() == b.as_f64(),
            _ => a.as_i32() == b.as_i32(),
        })
    }
}

pub fn bool_str(value: i32) -> &'static str {
    if value != 0 {
        "true"
    } else {
        "false"
    }
}

fn quote(s: &str) -> String {
    if s.contains('\'') && !s.contains('"') {
        format!("\"{s}\"")
    } else {
        format!("'{}'", s.replace('\'', "\\'"))
    }
}

fn kind_mismatch(handle: i32, expected: &str) -> Fault {
    Fault::Internal(format!("handle {handle} is not a {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(100, 1024, 1 << 20)
    }

    #[test]
    fn test_handle_zero_is_uninitialized() {
        let h = heap();
        assert_eq!(h.str(0), Err(Fault::Uninitialized));
    }

    #[test]
    fn test_literals_are_shared() {
        let mut h = heap();
        assert_eq!(h.cached_literal(0, 2), None);
        let a = h.intern_literal(0, 2, "hi".into()).unwrap();
        assert_eq!(h.cached_literal(0, 2), Some(a));
        assert_eq!(h.str(a).unwrap(), "hi");
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_string_of_nested_arrays() {
        let mut h = heap();
        let inner1 = h.alloc_array(abi::KIND_NUMBER, vec![Elem::Num(1.0), Elem::Num(2.0)]).unwrap();
        let inner2 = h.alloc_array(abi::KIND_NUMBER, vec![Elem::Num(3.0)]).unwrap();
        let outer = h
            .alloc_array(abi::KIND_ARRAY, vec![Elem::Ref(inner1), Elem::Ref(inner2)])
            .unwrap();
        assert_eq!(h.to_js_string(abi::KIND_ARRAY, Elem::Ref(outer)).unwrap(), "1,2,3");
        assert_eq!(
            h.inspect(abi::KIND_ARRAY, Elem::Ref(outer), false).unwrap(),
            "[ [ 1, 2 ], [ 3 ] ]"
        );
    }

    #[test]
    fn test_inspect_quotes_nested_strings() {
        let mut h = heap();
        let a = h.alloc_str("a".into()).unwrap();
        let b = h.alloc_str("it's".into()).unwrap();
        let arr = h.alloc_array(abi::KIND_STRING, vec![Elem::Ref(a), Elem::Ref(b)]).unwrap();
        assert_eq!(
            h.inspect(abi::KIND_ARRAY, Elem::Ref(arr), false).unwrap(),
            "[ 'a', \"it's\" ]"
        );
        assert_eq!(h.inspect(abi::KIND_STRING, Elem::Ref(a), false).unwrap(), "a");
        let empty = h.alloc_array(abi::KIND_BOOLEAN, vec![]).unwrap();
        assert_eq!(h.inspect(abi::KIND_ARRAY, Elem::Ref(empty), false).unwrap(), "[]");
    }

    #[test]
    fn test_error_strings() {
        let mut h = heap();
        let msg = h.alloc_str("boom".into()).unwrap();
        let err = h.alloc_error(msg).unwrap();
        assert_eq!(h.error_string(err).unwrap(), "Error: boom");
        let empty = h.alloc_str(String::new()).unwrap();
        let err = h.alloc_error(empty).unwrap();
        assert_eq!(h.error_string(err).unwrap(), "Error");
    }

    #[test]
    fn test_limits() {
        let mut h = Heap::new(1, 4, 1024);
        assert!(h.alloc_str("abcde".into()).is_err());
        h.alloc_str("ab".into()).unwrap();
        assert_eq!(h.alloc_str("c".into()), Err(Fault::HeapLimit { limit: 1 }));
    }

    #[test]
    fn test_string_bytes_are_charged() {
        let mut h = Heap::new(100, 16, 10);
        h.alloc_str("abcd".into()).unwrap();
        h.alloc_str("efgh".into()).unwrap();
        assert_eq!(h.bytes(), 8);
        assert_eq!(
            h.alloc_str("ijk".into()),
            Err(Fault::MemoryLimit { limit: 10 })
        );
        assert_eq!(h.bytes(), 8, "a refused allocation is not charged");
        h.alloc_str("ij".into()).unwrap();
    }

    #[test]
    fn test_array_slots_are_charged() {
        let mut h = Heap::new(100, 16, 2 * ELEM_BYTES);
        h.alloc_array(abi::KIND_NUMBER, vec![Elem::Num(1.0), Elem::Num(2.0)])
            .unwrap();
        assert_eq!(
            h.alloc_array(abi::KIND_NUMBER, vec![Elem::Num(3.0)]),
            Err(Fault::MemoryLimit {
                limit: 2 * ELEM_BYTES
            })
        );
        assert!(h.charge(1).is_err());
    }

    #[test]
    fn test_strict_equality_by_kind() {
        let mut h = heap();
        let a = h.alloc_str("x".into()).unwrap();
        let b = h.alloc_str("x".into()).unwrap();
        assert!(h.strict_equals(abi::KIND_STRING, Elem::Ref(a), Elem::Ref(b)).unwrap());
        let xs = h.alloc_array(abi::KIND_NUMBER, vec![]).unwrap();
        let ys = h.alloc_array(abi::KIND_NUMBER, vec![]).unwrap();
        assert!(!h.strict_equals(abi::KIND_ARRAY, Elem::Ref(xs), Elem::Ref(ys)).unwrap());
        assert!(!h.strict_equals(abi::KIND_NUMBER, Elem::Num(f64::NAN), Elem::Num(f64::NAN)).unwrap());
    }
}
