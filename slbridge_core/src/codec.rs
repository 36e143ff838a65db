//! Binary layouts of the controller's state messages
//!
//! Every message is a flat run of native-endian `f32`. The controller indexes
//! its vectors and matrices from one (Numerical Recipes convention), so the
//! joint state carries an unused zero row before and after the payload. The
//! padding is kept here as named constants instead of literal offsets.

use crate::error::{BridgeError, BridgeResult};
use nalgebra::DMatrix;

pub const FLOAT_BYTES: usize = std::mem::size_of::<f32>();
/// Every message starts with a timestamp scalar
pub const TIMESTAMP_BYTES: usize = FLOAT_BYTES;
/// Zero rows before and after the joint state payload
pub const PADDING_ROWS: usize = 1;
/// Zero scalar after the base state matrix, needed for the controller's alignment
pub const BASE_STATE_TRAILING_PAD: usize = 1;
/// Base orientation rows copied in full
pub const ORIENT_FULL_ROWS: usize = 3;
/// Base orientation rows copied as a fixed-length slice
pub const ORIENT_SLICED_ROWS: usize = 2;
pub const ORIENT_SLICE_LEN: usize = 4;
/// Column count of the inbound command matrix
pub const COMMAND_COLUMNS: usize = 5;

/// A timestamped matrix as laid out in shared memory
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: f32,
    pub data: DMatrix<f32>,
}

/// Base orientation payload: three full rows followed by two 4-element slices
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationFrame {
    pub timestamp: f32,
    pub values: Vec<f32>,
}

/// Reinterpret floats as their native-endian bytes
pub fn floats_to_bytes(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Reinterpret native-endian bytes as floats
pub fn bytes_to_floats(bytes: &[u8]) -> BridgeResult<Vec<f32>> {
    if bytes.len() % FLOAT_BYTES != 0 {
        return Err(BridgeError::layout(format!(
            "{} bytes is not a whole number of floats",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(FLOAT_BYTES)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect())
}

/// Reshape bytes into a row-major matrix with `ncols` columns
pub fn bytes_to_matrix(bytes: &[u8], ncols: usize) -> BridgeResult<DMatrix<f32>> {
    if ncols == 0 {
        return Err(BridgeError::layout("matrix needs at least one column"));
    }
    let values = bytes_to_floats(bytes)?;
    if values.len() % ncols != 0 {
        return Err(BridgeError::layout(format!(
            "{} floats do not fill rows of {} columns",
            values.len(),
            ncols
        )));
    }
    Ok(DMatrix::from_row_slice(values.len() / ncols, ncols, &values))
}

fn push_rows(out: &mut Vec<f32>, matrix: &DMatrix<f32>) {
    for row in matrix.row_iter() {
        out.extend(row.iter());
    }
}

fn push_zeros(out: &mut Vec<f32>, n: usize) {
    out.resize(out.len() + n, 0.0);
}

fn split_timestamp(bytes: &[u8]) -> BridgeResult<(f32, &[u8])> {
    if bytes.len() < TIMESTAMP_BYTES {
        return Err(BridgeError::layout(format!(
            "{} bytes cannot hold a timestamp",
            bytes.len()
        )));
    }
    let (head, rest) = bytes.split_at(TIMESTAMP_BYTES);
    Ok((bytemuck::pod_read_unaligned::<f32>(head), rest))
}

fn expect_len(what: &str, bytes: &[u8], expected: usize) -> BridgeResult<()> {
    if bytes.len() != expected {
        return Err(BridgeError::layout(format!(
            "{} needs {} bytes, got {}",
            what,
            expected,
            bytes.len()
        )));
    }
    Ok(())
}

// Joint state: timestamp, then (ndof + 2) x ncols rows with zero rows 0 and ndof + 1

/// Encoded size of a joint state with `ndof` joints and `ncols` values per joint
pub fn joint_state_len(ndof: usize, ncols: usize) -> usize {
    TIMESTAMP_BYTES + (ndof + 2 * PADDING_ROWS) * ncols * FLOAT_BYTES
}

pub fn encode_joint_state(state: &DMatrix<f32>, timestamp: f32) -> Vec<u8> {
    let (ndof, ncols) = state.shape();
    let mut out = Vec::with_capacity(joint_state_len(ndof, ncols) / FLOAT_BYTES);
    out.push(timestamp);
    push_zeros(&mut out, PADDING_ROWS * ncols);
    push_rows(&mut out, state);
    push_zeros(&mut out, PADDING_ROWS * ncols);
    floats_to_bytes(&out)
}

/// Decode a joint state, keeping the padding rows (logical rows are `1..=ndof`)
pub fn decode_joint_state(bytes: &[u8], ndof: usize, ncols: usize) -> BridgeResult<Frame> {
    expect_len("joint state", bytes, joint_state_len(ndof, ncols))?;
    let (timestamp, rest) = split_timestamp(bytes)?;
    let values = bytes_to_floats(rest)?;
    Ok(Frame {
        timestamp,
        data: DMatrix::from_row_slice(ndof + 2 * PADDING_ROWS, ncols, &values),
    })
}

// Base state: timestamp, 3 * nrows x ncols rows with data in the middle third, one zero pad

pub fn base_state_len(nrows: usize, ncols: usize) -> usize {
    TIMESTAMP_BYTES + (3 * nrows * ncols + BASE_STATE_TRAILING_PAD) * FLOAT_BYTES
}

pub fn encode_base_state(state: &DMatrix<f32>, timestamp: f32) -> Vec<u8> {
    let (nrows, ncols) = state.shape();
    let mut out = Vec::with_capacity(base_state_len(nrows, ncols) / FLOAT_BYTES);
    out.push(timestamp);
    push_zeros(&mut out, nrows * ncols);
    push_rows(&mut out, state);
    push_zeros(&mut out, nrows * ncols);
    push_zeros(&mut out, BASE_STATE_TRAILING_PAD);
    floats_to_bytes(&out)
}

/// Decode a base state into the full `3 * nrows` row block
pub fn decode_base_state(bytes: &[u8], nrows: usize, ncols: usize) -> BridgeResult<Frame> {
    expect_len("base state", bytes, base_state_len(nrows, ncols))?;
    let (timestamp, rest) = split_timestamp(bytes)?;
    let values = bytes_to_floats(rest)?;
    let matrix_len = 3 * nrows * ncols;
    Ok(Frame {
        timestamp,
        data: DMatrix::from_row_slice(3 * nrows, ncols, &values[..matrix_len]),
    })
}

// Base orientation: flat vector of (nrows * ncols - 2) * 3 + 1 floats, timestamp at 0,
// payload starting at nrows * ncols - 1

pub fn base_orientation_floats(nrows: usize, ncols: usize) -> usize {
    (nrows * ncols).saturating_sub(2) * 3 + 1
}

pub fn base_orientation_len(nrows: usize, ncols: usize) -> usize {
    base_orientation_floats(nrows, ncols) * FLOAT_BYTES
}

/// Index of the first payload float
pub fn base_orientation_offset(nrows: usize, ncols: usize) -> usize {
    nrows * ncols - 1
}

fn orientation_payload_len(ncols: usize) -> usize {
    ORIENT_FULL_ROWS * ncols + ORIENT_SLICED_ROWS * ORIENT_SLICE_LEN
}

fn check_orientation_shape(nrows: usize, ncols: usize) -> BridgeResult<()> {
    if nrows < ORIENT_FULL_ROWS + ORIENT_SLICED_ROWS || ncols < ORIENT_SLICE_LEN {
        return Err(BridgeError::layout(format!(
            "base orientation needs at least {}x{}, got {}x{}",
            ORIENT_FULL_ROWS + ORIENT_SLICED_ROWS,
            ORIENT_SLICE_LEN,
            nrows,
            ncols
        )));
    }
    let end = base_orientation_offset(nrows, ncols) + orientation_payload_len(ncols);
    if end > base_orientation_floats(nrows, ncols) {
        return Err(BridgeError::layout(format!(
            "base orientation payload of {}x{} overruns the buffer",
            nrows, ncols
        )));
    }
    Ok(())
}

pub fn encode_base_orientation(orient: &DMatrix<f32>, timestamp: f32) -> BridgeResult<Vec<u8>> {
    let (nrows, ncols) = orient.shape();
    check_orientation_shape(nrows, ncols)?;

    let mut payload = Vec::with_capacity(orientation_payload_len(ncols));
    for r in 0..ORIENT_FULL_ROWS {
        payload.extend(orient.row(r).iter());
    }
    for r in ORIENT_FULL_ROWS..ORIENT_FULL_ROWS + ORIENT_SLICED_ROWS {
        payload.extend(orient.row(r).iter().take(ORIENT_SLICE_LEN));
    }

    let mut out = vec![0.0f32; base_orientation_floats(nrows, ncols)];
    out[0] = timestamp;
    let start = base_orientation_offset(nrows, ncols);
    out[start..start + payload.len()].copy_from_slice(&payload);
    Ok(floats_to_bytes(&out))
}

pub fn decode_base_orientation(
    bytes: &[u8],
    nrows: usize,
    ncols: usize,
) -> BridgeResult<OrientationFrame> {
    check_orientation_shape(nrows, ncols)?;
    expect_len("base orientation", bytes, base_orientation_len(nrows, ncols))?;
    let values = bytes_to_floats(bytes)?;
    let start = base_orientation_offset(nrows, ncols);
    Ok(OrientationFrame {
        timestamp: values[0],
        values: values[start..start + orientation_payload_len(ncols)].to_vec(),
    })
}

// Commands: timestamp, then rows of COMMAND_COLUMNS floats

/// Decode the inbound command vector; the row count follows from the length
pub fn decode_commands(bytes: &[u8], ncols: usize) -> BridgeResult<Frame> {
    let (timestamp, rest) = split_timestamp(bytes)?;
    Ok(Frame {
        timestamp,
        data: bytes_to_matrix(rest, ncols)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(nrows: usize, ncols: usize) -> DMatrix<f32> {
        DMatrix::from_fn(nrows, ncols, |r, c| (r * 10 + c) as f32 + 0.5)
    }

    fn row_block(m: &DMatrix<f32>, start: usize, n: usize) -> DMatrix<f32> {
        DMatrix::from_fn(n, m.ncols(), |r, c| m[(start + r, c)])
    }

    #[test]
    fn test_joint_state_layout() {
        let state = sample(3, 4);
        let bytes = encode_joint_state(&state, 1.5);
        assert_eq!(bytes.len(), (3 + 2) * 4 * 4 + 4);

        let frame = decode_joint_state(&bytes, 3, 4).unwrap();
        assert_relative_eq!(frame.timestamp, 1.5);
        assert_eq!(frame.data.shape(), (5, 4));
        assert_eq!(row_block(&frame.data, 1, 3), state);
        assert!(frame.data.row(0).iter().all(|v| *v == 0.0));
        assert!(frame.data.row(4).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_joint_state_row_major() {
        let state = DMatrix::from_row_slice(1, 2, &[3.0, 4.0]);
        let floats = bytes_to_floats(&encode_joint_state(&state, 9.0)).unwrap();
        assert_eq!(floats, vec![9.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_base_state_layout() {
        let state = sample(2, 3);
        let bytes = encode_base_state(&state, 2.0);
        assert_eq!(bytes.len(), base_state_len(2, 3));
        assert_eq!(bytes.len(), (1 + 3 * 2 * 3 + 1) * 4);

        let floats = bytes_to_floats(&bytes).unwrap();
        assert_eq!(*floats.last().unwrap(), 0.0);

        let frame = decode_base_state(&bytes, 2, 3).unwrap();
        assert_relative_eq!(frame.timestamp, 2.0);
        assert_eq!(row_block(&frame.data, 2, 2), state);
        assert!(row_block(&frame.data, 0, 2).iter().all(|v| *v == 0.0));
        assert!(row_block(&frame.data, 4, 2).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_base_orientation_layout() {
        let orient = sample(5, 4);
        let bytes = encode_base_orientation(&orient, 0.25).unwrap();
        assert_eq!(bytes.len(), ((5 * 4 - 2) * 3 + 1) * 4);

        let floats = bytes_to_floats(&bytes).unwrap();
        assert_relative_eq!(floats[0], 0.25);
        assert!(floats[1..19].iter().all(|v| *v == 0.0));

        let frame = decode_base_orientation(&bytes, 5, 4).unwrap();
        let mut expected: Vec<f32> = Vec::new();
        for r in 0..5 {
            expected.extend(orient.row(r).iter());
        }
        assert_eq!(frame.values, expected);
        assert_eq!(&floats[19..39], expected.as_slice());
        assert!(floats[39..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_base_orientation_slices_wide_rows() {
        let orient = sample(5, 6);
        let frame =
            decode_base_orientation(&encode_base_orientation(&orient, 0.0).unwrap(), 5, 6).unwrap();
        assert_eq!(frame.values.len(), 3 * 6 + 2 * 4);
        assert_eq!(&frame.values[18..22], &[30.5, 31.5, 32.5, 33.5]);
        assert_eq!(&frame.values[22..], &[40.5, 41.5, 42.5, 43.5]);
    }

    #[test]
    fn test_base_orientation_too_small() {
        assert!(encode_base_orientation(&sample(4, 4), 0.0).is_err());
        assert!(encode_base_orientation(&sample(5, 3), 0.0).is_err());
    }

    #[test]
    fn test_decode_commands() {
        let mut floats = vec![7.0f32];
        floats.extend((0..10).map(|v| v as f32));
        let bytes = floats_to_bytes(&floats);
        assert_eq!(bytes.len(), 44);

        let frame = decode_commands(&bytes, COMMAND_COLUMNS).unwrap();
        assert_relative_eq!(frame.timestamp, 7.0);
        assert_eq!(frame.data.shape(), (2, 5));
        assert_eq!(frame.data[(0, 4)], 4.0);
        assert_eq!(frame.data[(1, 0)], 5.0);
    }

    #[test]
    fn test_decode_commands_ragged() {
        let bytes = floats_to_bytes(&[0.0; 8]);
        assert!(matches!(
            decode_commands(&bytes, COMMAND_COLUMNS),
            Err(BridgeError::Layout(_))
        ));
        assert!(decode_commands(&[0u8; 2], COMMAND_COLUMNS).is_err());
    }

    #[test]
    fn test_wrong_length_decode() {
        let bytes = encode_joint_state(&sample(3, 4), 0.0);
        assert!(decode_joint_state(&bytes, 4, 4).is_err());
        assert!(decode_base_state(&bytes, 3, 4).is_err());
    }
}
