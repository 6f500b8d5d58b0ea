//! Host imports: the runtime library every emitted module links against.
//!
//! Each import is bound per run to the [`HostState`] of that run's store.
//! A host function that detects a fault records it in the state and returns
//! an error, which unwinds the Wasm call stack.

use kata_types::abi::{self, HostFn};
use wasmi::{Caller, Extern, Linker};

use crate::fault::Fault;
use crate::format::{self, exact_index, format_number, relative_index, to_integer};
use crate::heap::{bool_str, Elem, Heap, ELEM_BYTES};
use crate::limits::SandboxLimits;
use crate::output::{CapturedOutput, Stream};

type HostResult<T> = Result<T, wasmi::Error>;

// ══════════════════════════════════════════════════════════════════════════════
// HostState
// ══════════════════════════════════════════════════════════════════════════════

/// Everything one run may touch. Owned by that run's `Store`.
#[derive(Debug)]
pub struct HostState {
    pub heap: Heap,
    /// Arguments of the console call in progress.
    staged: Vec<String>,
    pub output: CapturedOutput,
    output_bytes: usize,
    limits: SandboxLimits,
    /// The fault that stopped the run, if a host function raised one.
    pub fault: Option<Fault>,
}

impl HostState {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            heap: Heap::new(
                limits.max_heap_objects,
                limits.max_string_bytes,
                limits.max_heap_bytes,
            ),
            staged: Vec::new(),
            output: CapturedOutput::new(),
            output_bytes: 0,
            limits,
            fault: None,
        }
    }

    /// Emit the staged console arguments as one line.
    fn flush(&mut self, stream: i32) -> Result<(), Fault> {
        let stream = Stream::from_code(stream)
            .ok_or_else(|| Fault::Internal(format!("unknown output stream {stream}")))?;
        let text = std::mem::take(&mut self.staged).join(" ");
        let separator = usize::from(!self.output.is_empty());
        self.output_bytes += text.len() + separator;
        if self.output_bytes > self.limits.max_output_bytes {
            return Err(Fault::OutputLimit {
                limit: self.limits.max_output_bytes,
            });
        }
        self.output.push(stream, text);
        Ok(())
    }

    fn alloc_string(&mut self, s: String) -> Result<i32, Fault> {
        self.heap.alloc_str(s)
    }

    fn string_array(&mut self, parts: Vec<String>) -> Result<i32, Fault> {
        let items = parts
            .into_iter()
            .map(|part| self.heap.alloc_str(part).map(Elem::Ref))
            .collect::<Result<Vec<_>, _>>()?;
        self.heap.alloc_array(abi::KIND_STRING, items)
    }
}

/// Run `op` against the state, turning a fault into a Wasm error.
fn with_state<R>(
    caller: &mut Caller<'_, HostState>,
    op: impl FnOnce(&mut HostState) -> Result<R, Fault>,
) -> HostResult<R> {
    let state = caller.data_mut();
    op(state).map_err(|fault| raise(state, fault))
}

fn raise(state: &mut HostState, fault: Fault) -> wasmi::Error {
    let error = wasmi::Error::new(fault.to_string());
    state.fault = Some(fault);
    error
}

fn read_literal(caller: &Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String, Fault> {
    let memory = caller
        .get_export(abi::MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| Fault::Internal("module exports no memory".into()))?;
    let data = memory.data(caller);
    let start = usize::try_from(ptr).map_err(|_| Fault::Internal("negative pointer".into()))?;
    let len = usize::try_from(len).map_err(|_| Fault::Internal("negative length".into()))?;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| Fault::Internal("string literal out of bounds".into()))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Fault::Internal("string literal is not UTF-8".into()))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ══════════════════════════════════════════════════════════════════════════════
// Linking
// ══════════════════════════════════════════════════════════════════════════════

/// Bind every host import to `linker`.
pub fn link(linker: &mut Linker<HostState>) -> HostResult<()> {
    link_console(linker)?;
    link_strings(linker)?;
    link_numbers(linker)?;
    link_arrays(linker)?;
    link_errors(linker)?;
    Ok(())
}

fn link_console(linker: &mut Linker<HostState>) -> HostResult<()> {
    const M: &str = abi::MODULE;

    linker.func_wrap(M, HostFn::ConNum.name(), |mut caller: Caller<'_, HostState>, n: f64| {
        caller.data_mut().staged.push(format_number(n));
    })?;
    linker.func_wrap(
        M,
        HostFn::ConStr.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<()> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?.to_string();
                st.staged.push(text);
                Ok(())
            })
        },
    )?;
    linker.func_wrap(M, HostFn::ConBool.name(), |mut caller: Caller<'_, HostState>, b: i32| {
        caller.data_mut().staged.push(bool_str(b).to_string());
    })?;
    linker.func_wrap(
        M,
        HostFn::ConRef.name(),
        |mut caller: Caller<'_, HostState>, r: i32| -> HostResult<()> {
            with_state(&mut caller, |st| {
                let kind = st.heap.kind_of(r)?;
                let text = st.heap.inspect(kind, Elem::Ref(r), false)?;
                st.staged.push(text);
                Ok(())
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ConFlush.name(),
        |mut caller: Caller<'_, HostState>, stream: i32| -> HostResult<()> {
            with_state(&mut caller, |st| st.flush(stream))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::Throw.name(),
        |mut caller: Caller<'_, HostState>, value: i32, is_error: i32| -> HostResult<()> {
            with_state(&mut caller, |st| {
                let message = if is_error != 0 {
                    st.heap.error_string(value)?
                } else {
                    format!("Uncaught {}", st.heap.str(value)?)
                };
                Err(Fault::Uncaught(message))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::GasExhausted.name(),
        |mut caller: Caller<'_, HostState>| -> HostResult<()> {
            with_state(&mut caller, |st| {
                Err(Fault::BudgetExhausted {
                    limit: st.limits.gas_limit,
                })
            })
        },
    )?;
    Ok(())
}

fn link_strings(linker: &mut Linker<HostState>) -> HostResult<()> {
    const M: &str = abi::MODULE;

    linker.func_wrap(
        M,
        HostFn::StrConst.name(),
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> HostResult<i32> {
            if let Some(handle) = caller.data().heap.cached_literal(ptr as u32, len as u32) {
                return Ok(handle);
            }
            let text = read_literal(&caller, ptr, len);
            with_state(&mut caller, |st| {
                st.heap.intern_literal(ptr as u32, len as u32, text?)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrConcat.name(),
        |mut caller: Caller<'_, HostState>, a: i32, b: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let joined = format!("{}{}", st.heap.str(a)?, st.heap.str(b)?);
                st.alloc_string(joined)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrEq.name(),
        |mut caller: Caller<'_, HostState>, a: i32, b: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(i32::from(st.heap.str(a)? == st.heap.str(b)?))
            })
        },
    )?;
    // String lengths, indices and ordering work on Unicode scalar values and
    // byte order, not UTF-16 code units. They differ from JS only outside the
    // Basic Multilingual Plane.
    linker.func_wrap(
        M,
        HostFn::StrCmp.name(),
        |mut caller: Caller<'_, HostState>, a: i32, b: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(st.heap.str(a)?.cmp(st.heap.str(b)?) as i32)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrLen.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| Ok(char_len(st.heap.str(s)?) as f64))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrAt.name(),
        |mut caller: Caller<'_, HostState>, s: i32, index: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?;
                let c = exact_index(index, char_len(text))
                    .and_then(|i| text.chars().nth(i))
                    .ok_or_else(|| Fault::read_out_of_range(&format_number(index)))?;
                st.alloc_string(c.to_string())
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrCharAt.name(),
        |mut caller: Caller<'_, HostState>, s: i32, index: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?;
                let index = to_integer(index);
                let c = if index >= 0.0 {
                    text.chars().nth(index as usize)
                } else {
                    None
                };
                st.alloc_string(c.map(String::from).unwrap_or_default())
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrUpper.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let upper = st.heap.str(s)?.to_uppercase();
                st.alloc_string(upper)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrLower.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let lower = st.heap.str(s)?.to_lowercase();
                st.alloc_string(lower)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrTrim.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let trimmed = st.heap.str(s)?.trim().to_string();
                st.alloc_string(trimmed)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrIncludes.name(),
        |mut caller: Caller<'_, HostState>, s: i32, needle: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(i32::from(st.heap.str(s)?.contains(st.heap.str(needle)?)))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrIndexOf.name(),
        |mut caller: Caller<'_, HostState>, s: i32, needle: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?;
                Ok(text
                    .find(st.heap.str(needle)?)
                    .map_or(-1.0, |byte| char_len(&text[..byte]) as f64))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrStartsWith.name(),
        |mut caller: Caller<'_, HostState>, s: i32, prefix: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(i32::from(st.heap.str(s)?.starts_with(st.heap.str(prefix)?)))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrEndsWith.name(),
        |mut caller: Caller<'_, HostState>, s: i32, suffix: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(i32::from(st.heap.str(s)?.ends_with(st.heap.str(suffix)?)))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrRepeat.name(),
        |mut caller: Caller<'_, HostState>, s: i32, count: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let count = to_integer(count);
                if count < 0.0 || count.is_infinite() {
                    return Err(Fault::RangeError(format!(
                        "Invalid count value: {}",
                        format_number(count)
                    )));
                }
                let text = st.heap.str(s)?;
                let too_long = (text.len() as f64) * count > st.limits.max_string_bytes as f64;
                if too_long {
                    return Err(Fault::RangeError("Invalid string length".into()));
                }
                let repeated = text.repeat(count as usize);
                st.alloc_string(repeated)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrSlice.name(),
        |mut caller: Caller<'_, HostState>, s: i32, start: f64, end: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?;
                let len = char_len(text);
                let (start, end) = (relative_index(start, len), relative_index(end, len));
                let slice: String = text
                    .chars()
                    .skip(start)
                    .take(end.saturating_sub(start))
                    .collect();
                st.alloc_string(slice)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrSplit.name(),
        |mut caller: Caller<'_, HostState>, s: i32, sep: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let text = st.heap.str(s)?;
                let sep = st.heap.str(sep)?;
                let parts: Vec<String> = if sep.is_empty() {
                    text.chars().map(String::from).collect()
                } else {
                    text.split(sep).map(String::from).collect()
                };
                st.string_array(parts)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrToNum.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| Ok(format::parse_number(st.heap.str(s)?)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::StrParseInt.name(),
        |mut caller: Caller<'_, HostState>, s: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| Ok(format::parse_int(st.heap.str(s)?)))
        },
    )?;
    Ok(())
}

fn link_numbers(linker: &mut Linker<HostState>) -> HostResult<()> {
    const M: &str = abi::MODULE;

    linker.func_wrap(
        M,
        HostFn::NumToStr.name(),
        |mut caller: Caller<'_, HostState>, n: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| st.alloc_string(format_number(n)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::NumToFixed.name(),
        |mut caller: Caller<'_, HostState>, n: f64, digits: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let fixed = format::to_fixed(n, digits)?;
                st.alloc_string(fixed)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::BoolToStr.name(),
        |mut caller: Caller<'_, HostState>, b: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| st.alloc_string(bool_str(b).to_string()))
        },
    )?;
    linker.func_wrap(M, HostFn::NumPow.name(), |_: Caller<'_, HostState>, x: f64, y: f64| {
        format::pow(x, y)
    })?;
    linker.func_wrap(M, HostFn::NumRem.name(), |_: Caller<'_, HostState>, x: f64, y: f64| {
        x % y
    })?;
    linker.func_wrap(M, HostFn::NumSign.name(), |_: Caller<'_, HostState>, x: f64| {
        format::sign(x)
    })?;
    Ok(())
}

fn link_arrays(linker: &mut Linker<HostState>) -> HostResult<()> {
    const M: &str = abi::MODULE;

    linker.func_wrap(
        M,
        HostFn::ArrNew.name(),
        |mut caller: Caller<'_, HostState>, kind: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| st.heap.alloc_array(kind, Vec::new()))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrPushF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: f64| -> HostResult<f64> {
            with_state(&mut caller, |st| push(st, arr, Elem::Num(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrPushI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| push(st, arr, Elem::Ref(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrGetF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, index: f64| -> HostResult<f64> {
            with_state(&mut caller, |st| get(st, arr, index).map(Elem::as_f64))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrGetI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, index: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| get(st, arr, index).map(Elem::as_i32))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrSetF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, index: f64, value: f64| -> HostResult<()> {
            with_state(&mut caller, |st| set(st, arr, index, Elem::Num(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrSetI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, index: f64, value: i32| -> HostResult<()> {
            with_state(&mut caller, |st| set(st, arr, index, Elem::Ref(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrPopF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| pop(st, arr).map(Elem::as_f64))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrPopI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| pop(st, arr).map(Elem::as_i32))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrLen.name(),
        |mut caller: Caller<'_, HostState>, arr: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| Ok(st.heap.array(arr)?.items.len() as f64))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrJoin.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, sep: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let joined = st.heap.join(arr, st.heap.str(sep)?)?;
                st.alloc_string(joined)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrIncludesF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                // SameValueZero: NaN includes NaN.
                let found = st.heap.array(arr)?.items.iter().any(|e| {
                    let x = e.as_f64();
                    x == value || (x.is_nan() && value.is_nan())
                });
                Ok(i32::from(found))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrIncludesI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                Ok(i32::from(index_of(&st.heap, arr, Elem::Ref(value))? >= 0.0))
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrIndexOfF64.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: f64| -> HostResult<f64> {
            with_state(&mut caller, |st| index_of(&st.heap, arr, Elem::Num(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrIndexOfI32.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, value: i32| -> HostResult<f64> {
            with_state(&mut caller, |st| index_of(&st.heap, arr, Elem::Ref(value)))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrReverse.name(),
        |mut caller: Caller<'_, HostState>, arr: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                st.heap.array_mut(arr)?.items.reverse();
                Ok(arr)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrSlice.name(),
        |mut caller: Caller<'_, HostState>, arr: i32, start: f64, end: f64| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let array = st.heap.array(arr)?;
                let len = array.items.len();
                let (start, end) = (relative_index(start, len), relative_index(end, len));
                let items = array.items[start..end.max(start)].to_vec();
                let kind = array.kind;
                st.heap.alloc_array(kind, items)
            })
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ArrToStr.name(),
        |mut caller: Caller<'_, HostState>, arr: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let joined = st.heap.join(arr, ",")?;
                st.alloc_string(joined)
            })
        },
    )?;
    Ok(())
}

fn link_errors(linker: &mut Linker<HostState>) -> HostResult<()> {
    const M: &str = abi::MODULE;

    linker.func_wrap(
        M,
        HostFn::ErrNew.name(),
        |mut caller: Caller<'_, HostState>, message: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| st.heap.alloc_error(message))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ErrMessage.name(),
        |mut caller: Caller<'_, HostState>, err: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| st.heap.error_message(err))
        },
    )?;
    linker.func_wrap(
        M,
        HostFn::ErrToStr.name(),
        |mut caller: Caller<'_, HostState>, err: i32| -> HostResult<i32> {
            with_state(&mut caller, |st| {
                let text = st.heap.error_string(err)?;
                st.alloc_string(text)
            })
        },
    )?;
    Ok(())
}

// ── Array helpers ────────────────────────────────────────────────────────────

fn push(st: &mut HostState, arr: i32, value: Elem) -> Result<f64, Fault> {
    st.heap.charge(ELEM_BYTES)?;
    let array = st.heap.array_mut(arr)?;
    array.items.push(value);
    Ok(array.items.len() as f64)
}

fn get(st: &HostState, arr: i32, index: f64) -> Result<Elem, Fault> {
    let items = &st.heap.array(arr)?.items;
    exact_index(index, items.len())
        .map(|i| items[i])
        .ok_or_else(|| Fault::read_out_of_range(&format_number(index)))
}

/// `arr[i] = v`; `i == length` appends.
fn set(st: &mut HostState, arr: i32, index: f64, value: Elem) -> Result<(), Fault> {
    let items = &mut st.heap.array_mut(arr)?.items;
    if let Some(i) = exact_index(index, items.len()) {
        items[i] = value;
    } else if index == items.len() as f64 {
        items.push(value);
        st.heap.charge(ELEM_BYTES)?;
    } else {
        return Err(Fault::RangeError(format!(
            "Invalid array index {} for an array of length {}",
            format_number(index),
            items.len()
        )));
    }
    Ok(())
}

fn pop(st: &mut HostState, arr: i32) -> Result<Elem, Fault> {
    st.heap
        .array_mut(arr)?
        .items
        .pop()
        .ok_or_else(|| Fault::TypeError("Cannot pop from an empty array".into()))
}

/// `indexOf` with strict equality for the array's element kind.
fn index_of(heap: &Heap, arr: i32, value: Elem) -> Result<f64, Fault> {
    let array = heap.array(arr)?;
    for (i, &item) in array.items.iter().enumerate() {
        if heap.strict_equals(array.kind, item, value)? {
            return Ok(i as f64);
        }
    }
    Ok(-1.0)
}
