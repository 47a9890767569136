/// Fill gaps in a forecast.
///
/// A gap takes the previous value; leading gaps take the first known value.
/// The result ends at the last known value, so an all-gap input is empty.
pub fn interpolate_array<T: Copy>(values: &[Option<T>]) -> Vec<T> {
    let Some(last_known) = values.iter().rposition(Option::is_some) else {
        return Vec::new();
    };
    let Some(mut last) = values.iter().flatten().next().copied() else {
        return Vec::new();
    };
    values[..=last_known]
        .iter()
        .map(|v| {
            if let Some(v) = v {
                last = *v;
            }
            last
        })
        .collect()
}

/// Pad the production forecast with zeros up to `min_len`
pub fn pad_production(prediction: &[i32], min_len: usize) -> Vec<i32> {
    let mut result = prediction.to_vec();
    if result.len() < min_len {
        result.resize(min_len, 0);
    }
    result
}

/// First `split_after` values from the total consumption forecast, the rest
/// from the unmanaged consumption forecast.
///
/// Near-term total consumption already contains running schedulable loads;
/// further out only the unmanaged part is predictable. Without an unmanaged
/// forecast the total forecast is used as is.
pub fn join_consumption(split_after: usize, total: &[Option<i32>], unmanaged: &[Option<i32>]) -> Vec<Option<i32>> {
    if unmanaged.is_empty() {
        return total.to_vec();
    }
    total
        .iter()
        .take(split_after)
        .chain(unmanaged.iter().skip(split_after))
        .copied()
        .collect()
}
