//! Purpose: Decode raw column slices into JSON values for `read` output.
//! Exports: `slice_json`.
//! Role: The only place the CLI interprets blob bytes; the library stays raw.
//! Invariants: Values are little-endian; vector types become per-row arrays.
//! Invariants: Non-finite doubles are emitted as `null`.

use refl_index::api::{ColumnSlice, Error, ErrorKind, Scalar};
use serde_json::{Value, json};

pub(crate) fn slice_json(slice: &ColumnSlice) -> Result<Value, Error> {
    let values = slice_values(slice)?;
    Ok(json!({
        "name": slice.column,
        "dtype": slice.dtype.tag(),
        "shape": slice.shape(),
        "values": values,
    }))
}

fn slice_values(slice: &ColumnSlice) -> Result<Vec<Value>, Error> {
    let scalar = slice.dtype.scalar();
    let components = slice.dtype.components();
    let elem = slice.dtype.elem_size();
    if slice.bytes.len() % elem != 0 {
        return Err(Error::new(ErrorKind::Internal)
            .with_message("slice length is not a whole number of rows")
            .with_column(&slice.column));
    }

    let mut rows = Vec::with_capacity(slice.bytes.len() / elem);
    for row in slice.bytes.chunks_exact(elem) {
        let mut parts = row
            .chunks_exact(scalar.size())
            .map(|bytes| scalar_value(scalar, bytes))
            .collect::<Result<Vec<_>, _>>()?;
        if slice.dtype.is_vector() {
            debug_assert_eq!(parts.len(), components);
            rows.push(Value::Array(parts));
        } else if let Some(value) = parts.pop() {
            rows.push(value);
        }
    }
    Ok(rows)
}

fn scalar_value(scalar: Scalar, bytes: &[u8]) -> Result<Value, Error> {
    let value = match scalar {
        Scalar::F64 => json!(f64::from_le_bytes(le_bytes(bytes)?)),
        Scalar::I32 => json!(i32::from_le_bytes(le_bytes(bytes)?)),
        Scalar::U64 => json!(u64::from_le_bytes(le_bytes(bytes)?)),
        Scalar::Bool => json!(bytes.first().is_some_and(|byte| *byte != 0)),
    };
    Ok(value)
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> Result<[u8; N], Error> {
    bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::Internal)
            .with_message("scalar width mismatch")
            .with_expected(format!("{N} bytes"))
            .with_found(format!("{} bytes", bytes.len()))
    })
}
