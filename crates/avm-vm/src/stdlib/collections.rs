//! `string`, `tuple`, `array` and `table` libraries.
//!
//! Growth allocates, which may move every object: refs are re-read from
//! the (rooted) arguments after each allocation.

use avm_runtime::objects::{array, string, table, tuple, values_equal};
use avm_runtime::{Value, ValueKind};

use crate::error::{Result, VmError};
use crate::native::{NativeCtx, NativeFlow, NativeRegistry};

const MIN_CAPACITY: usize = 4;

pub(super) fn register(registry: &mut NativeRegistry) {
    registry.register_lib(
        "string",
        &[("len", string_len), ("concat", string_concat), ("eq", string_eq)],
    );
    registry.register_lib(
        "tuple",
        &[
            ("new", tuple_new),
            ("get", tuple_get),
            ("set", tuple_set),
            ("len", tuple_len),
        ],
    );
    registry.register_lib(
        "array",
        &[
            ("new", array_new),
            ("push", array_push),
            ("get", array_get),
            ("set", array_set),
            ("len", array_len),
        ],
    );
    registry.register_lib(
        "table",
        &[
            ("new", table_new),
            ("get", table_get),
            ("set", table_set),
            ("len", table_len),
        ],
    );
}

fn count_arg(ctx: &NativeCtx<'_>, i: usize) -> Result<usize> {
    let n = ctx.arg_integer(i)?;
    usize::try_from(n).map_err(|_| VmError::InvalidIndex {
        what: "count",
        index: n,
    })
}

// =============================================================================
// string
// =============================================================================

fn string_len(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::String)?;
    let len = string::len(ctx.heap(), r)?;
    ctx.set_result(Value::Integer(len as i64));
    Ok(NativeFlow::Return)
}

/// Concatenates all arguments, which must be strings.
fn string_concat(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let mut bytes = Vec::new();
    for i in 0..ctx.nargs() {
        let r = ctx.arg_ref(i, ValueKind::String)?;
        bytes.extend_from_slice(string::bytes(ctx.heap(), r)?);
    }
    let s = ctx.actor_mut().new_string(&bytes)?;
    ctx.set_result(s);
    Ok(NativeFlow::Return)
}

fn string_eq(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    ctx.expect_args(2)?;
    let eq = values_equal(ctx.heap(), ctx.arg(0), ctx.arg(1))?;
    ctx.set_result(Value::Boolean(eq));
    Ok(NativeFlow::Return)
}

// =============================================================================
// tuple
// =============================================================================

fn tuple_new(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let len = count_arg(ctx, 0)?;
    let t = ctx.actor_mut().new_tuple(len)?;
    ctx.set_result(t);
    Ok(NativeFlow::Return)
}

fn tuple_get(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Tuple)?;
    let v = tuple::get(ctx.heap(), r, ctx.arg_integer(1)?)?;
    ctx.set_result(v);
    Ok(NativeFlow::Return)
}

fn tuple_set(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Tuple)?;
    let idx = ctx.arg_integer(1)?;
    let v = ctx.arg(2);
    tuple::set(ctx.heap_mut(), r, idx, v)?;
    Ok(NativeFlow::Return)
}

fn tuple_len(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Tuple)?;
    let len = tuple::len(ctx.heap(), r)?;
    ctx.set_result(Value::Integer(len as i64));
    Ok(NativeFlow::Return)
}

// =============================================================================
// array
// =============================================================================

fn array_new(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.actor_mut().alloc(ValueKind::Array, array::PAYLOAD_SIZE)?;
    ctx.set_result(Value::Array(r));
    Ok(NativeFlow::Return)
}

/// Doubles the backing store of the array in argument 0.
fn grow_array(ctx: &mut NativeCtx<'_>) -> Result<()> {
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let cap = array::capacity(ctx.heap(), r)?;
    let store = ctx.actor_mut().new_tuple((cap * 2).max(MIN_CAPACITY))?;
    let store = store.gc_ref().ok_or(VmError::StackUnderflow)?;

    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let heap = ctx.heap_mut();
    if let Some(old) = array::backing(heap, r)? {
        for i in 0..array::len(heap, r)? as i64 {
            let v = tuple::get(heap, old, i)?;
            tuple::set(heap, store, i, v)?;
        }
    }
    array::set_backing(heap, r, store)?;
    Ok(())
}

/// `push(a, v)` appends and returns the new length.
fn array_push(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    ctx.expect_args(2)?;
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    if array::len(ctx.heap(), r)? >= array::capacity(ctx.heap(), r)? {
        grow_array(ctx)?;
    }
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let v = ctx.arg(1);
    array::push_within_capacity(ctx.heap_mut(), r, v)?;
    let len = array::len(ctx.heap(), r)?;
    ctx.set_result(Value::Integer(len as i64));
    Ok(NativeFlow::Return)
}

fn array_get(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let v = array::get(ctx.heap(), r, ctx.arg_integer(1)?)?;
    ctx.set_result(v);
    Ok(NativeFlow::Return)
}

fn array_set(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let idx = ctx.arg_integer(1)?;
    let v = ctx.arg(2);
    array::set(ctx.heap_mut(), r, idx, v)?;
    Ok(NativeFlow::Return)
}

fn array_len(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Array)?;
    let len = array::len(ctx.heap(), r)?;
    ctx.set_result(Value::Integer(len as i64));
    Ok(NativeFlow::Return)
}

// =============================================================================
// table
// =============================================================================

fn table_new(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.actor_mut().alloc(ValueKind::Table, table::PAYLOAD_SIZE)?;
    ctx.set_result(Value::Table(r));
    Ok(NativeFlow::Return)
}

fn table_get(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Table)?;
    let v = table::get(ctx.heap(), r, ctx.arg(1))?;
    ctx.set_result(v);
    Ok(NativeFlow::Return)
}

/// `set(t, k, v)` inserts or replaces.
fn table_set(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    ctx.expect_args(3)?;
    let r = ctx.arg_ref(0, ValueKind::Table)?;
    let (key, value) = (ctx.arg(1), ctx.arg(2));
    if table::try_set(ctx.heap_mut(), r, key, value)? {
        return Ok(NativeFlow::Return);
    }

    let cap = table::capacity(ctx.heap(), r)?;
    let store = ctx.actor_mut().new_tuple((cap * 2).max(MIN_CAPACITY) * 2)?;
    let store = store.gc_ref().ok_or(VmError::StackUnderflow)?;
    let r = ctx.arg_ref(0, ValueKind::Table)?;
    let (key, value) = (ctx.arg(1), ctx.arg(2));
    table::set_backing(ctx.heap_mut(), r, store)?;
    table::try_set(ctx.heap_mut(), r, key, value)?;
    Ok(NativeFlow::Return)
}

fn table_len(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let r = ctx.arg_ref(0, ValueKind::Table)?;
    let len = table::len(ctx.heap(), r)?;
    ctx.set_result(Value::Integer(len as i64));
    Ok(NativeFlow::Return)
}
