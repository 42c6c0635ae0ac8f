//! Benjamini-Hochberg false discovery rate correction.

/// Apply Benjamini-Hochberg FDR correction.
///
/// For p-values sorted ascending, the adjusted value is
/// `q[i] = min(p[i] * m / rank[i], q[i+1])`, capped at 1, where `m` is the
/// number of finite p-values. NaN p-values (untestable comparisons) come back
/// as NaN and do not count toward `m`.
pub fn correct_bh(p_values: &[f64]) -> Vec<f64> {
    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let m = indices.len();
    let mut q_values = vec![f64::NAN; p_values.len()];
    if m == 0 {
        return q_values;
    }

    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m_f64 = m as f64;
    let mut running = 1.0_f64;
    for (pos, &idx) in indices.iter().enumerate().rev() {
        let rank = (pos + 1) as f64;
        let adjusted = p_values[idx] * m_f64 / rank;
        running = running.min(adjusted);
        q_values[idx] = running.min(1.0);
    }

    q_values
}

/// Number of p-values that take part in the correction.
pub fn n_tested(p_values: &[f64]) -> usize {
    p_values.iter().filter(|p| !p.is_nan()).count()
}
