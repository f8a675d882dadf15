//! Statistics toolkit
//!
//! NaN-aware descriptive statistics plus the hypothesis tests used to compare
//! two arms of glucose profiles:
//! - Lilliefors normality test (Dallal–Wilkinson p-value approximation)
//! - paired and pooled two-sample Student t-tests
//! - Wilcoxon signed-rank and Mann–Whitney U tests (normal approximation
//!   with tie correction)

use std::f64::consts::{PI, SQRT_2};

use crate::types::{StatTest, TestOutcome};

/// Lilliefors p-value above which a sample is treated as normal
pub const NORMALITY_P_THRESHOLD: f64 = 0.1;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

// ============================================================================
// Descriptive statistics
// ============================================================================

/// Values with NaNs removed
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Mean ignoring NaNs (NaN when nothing is left)
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Standard deviation ignoring NaNs with `ddof` delta degrees of freedom
pub fn nanstd(values: &[f64], ddof: usize) -> f64 {
    let data = finite(values);
    if data.len() <= ddof {
        return f64::NAN;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let ss: f64 = data.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (data.len() - ddof) as f64).sqrt()
}

/// Percentile (0..=100) ignoring NaNs, linear interpolation between order statistics
pub fn nanpercentile(values: &[f64], p: f64) -> f64 {
    let mut data = finite(values);
    if data.is_empty() {
        return f64::NAN;
    }
    data.sort_by(f64::total_cmp);
    percentile_sorted(&data, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let pos = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Median ignoring NaNs
pub fn nanmedian(values: &[f64]) -> f64 {
    nanpercentile(values, 50.0)
}

/// Minimum ignoring NaNs
pub fn nanmin(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f64::min)
        .unwrap_or(f64::NAN)
}

/// Maximum ignoring NaNs
pub fn nanmax(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f64::max)
        .unwrap_or(f64::NAN)
}

// ============================================================================
// Special functions
// ============================================================================

/// Natural logarithm of the gamma function (Lanczos approximation)
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS_COEFFICIENTS[0];
    for (i, c) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularised incomplete beta function I_x(a, b)
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln())
        .exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPS: f64 = 3e-14;
    const FPMIN: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Complementary error function (Chebyshev fit, |error| < 1.2e-7)
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
            .exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Two-tailed p-value of a standard normal statistic
fn normal_two_tailed_p(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2).min(1.0)
}

/// Two-tailed p-value of a Student t statistic with `df` degrees of freedom
pub fn student_t_two_tailed_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    incomplete_beta(df / 2.0, 0.5, df / (df + t * t))
}

// ============================================================================
// Hypothesis tests
// ============================================================================

/// Lilliefors test for normality, returns the p-value.
///
/// The Dallal–Wilkinson approximation is only accurate for small p-values;
/// larger values are capped at 1 and only compared against
/// [`NORMALITY_P_THRESHOLD`].
pub fn lilliefors(values: &[f64]) -> f64 {
    let data = finite(values);
    let n = data.len();
    if n < 4 {
        return f64::NAN;
    }
    let mean = nanmean(&data);
    let std = nanstd(&data, 1);
    if std == 0.0 || std.is_nan() {
        return f64::NAN;
    }

    let mut z: Vec<f64> = data.iter().map(|v| (v - mean) / std).collect();
    z.sort_by(f64::total_cmp);

    let nf = n as f64;
    let d = z
        .iter()
        .enumerate()
        .map(|(i, &zi)| {
            let cdf = normal_cdf(zi);
            let d_plus = (i + 1) as f64 / nf - cdf;
            let d_minus = cdf - i as f64 / nf;
            d_plus.max(d_minus)
        })
        .fold(f64::MIN, f64::max);

    let (d, nf) = if n > 100 {
        (d * (nf / 100.0).powf(0.49), 100.0)
    } else {
        (d, nf)
    };
    let p = (-7.01256 * d * d * (nf + 2.78019) + 2.99587 * d * (nf + 2.78019).sqrt() - 0.122119
        + 0.974598 / nf.sqrt()
        + 1.67997 / nf)
        .exp();
    p.min(1.0)
}

/// Whether a sample can be treated as normally distributed.
///
/// Samples too small to test (fewer than four values) are treated as normal.
pub fn is_normal(values: &[f64]) -> bool {
    let data = finite(values);
    if data.len() < 4 {
        return true;
    }
    let p = lilliefors(&data);
    // Constant samples have no spread to test
    p.is_nan() || p > NORMALITY_P_THRESHOLD
}

/// Paired Student t-test, returns the two-tailed p-value
pub fn paired_t_test(x: &[f64], y: &[f64]) -> f64 {
    let diff: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).collect();
    let n = diff.len();
    if n < 2 {
        return f64::NAN;
    }
    let se = nanstd(&diff, 1) / (n as f64).sqrt();
    student_t_two_tailed_p(nanmean(&diff) / se, (n - 1) as f64)
}

/// Two-sample Student t-test with pooled variance, returns the two-tailed p-value
pub fn two_sample_t_test(x: &[f64], y: &[f64]) -> f64 {
    let (n1, n2) = (x.len(), y.len());
    if n1 < 2 || n2 < 2 {
        return f64::NAN;
    }
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let pooled = ((n1f - 1.0) * nanstd(x, 1).powi(2) + (n2f - 1.0) * nanstd(y, 1).powi(2))
        / (n1f + n2f - 2.0);
    let t = (nanmean(x) - nanmean(y)) / (pooled * (1.0 / n1f + 1.0 / n2f)).sqrt();
    student_t_two_tailed_p(t, n1f + n2f - 2.0)
}

/// Average ranks (1-based) and tie group sizes
fn rank_with_ties(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        ties.push(j - i + 1);
        i = j + 1;
    }
    (ranks, ties)
}

fn tie_term(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

/// Wilcoxon signed-rank test, returns the two-tailed p-value.
///
/// Zero differences are discarded before ranking.
pub fn wilcoxon_signed_rank(x: &[f64], y: &[f64]) -> f64 {
    let diff: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(a, b)| a - b)
        .filter(|d| *d != 0.0)
        .collect();
    let n = diff.len();
    if n == 0 {
        return f64::NAN;
    }
    let magnitudes: Vec<f64> = diff.iter().map(|d| d.abs()).collect();
    let (ranks, ties) = rank_with_ties(&magnitudes);
    let w_plus: f64 = ranks
        .iter()
        .zip(&diff)
        .filter(|(_, d)| **d > 0.0)
        .map(|(r, _)| r)
        .sum();

    let nf = n as f64;
    let mean = nf * (nf + 1.0) / 4.0;
    let var = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term(&ties) / 48.0;
    if var <= 0.0 {
        return f64::NAN;
    }
    normal_two_tailed_p((w_plus - mean) / var.sqrt())
}

/// Mann–Whitney U test with continuity correction, returns the two-tailed p-value
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> f64 {
    let (n1, n2) = (x.len(), y.len());
    if n1 == 0 || n2 == 0 {
        return f64::NAN;
    }
    let combined: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, ties) = rank_with_ties(&combined);
    let r1: f64 = ranks[..n1].iter().sum();

    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let n = n1f + n2f;
    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let mean = n1f * n2f / 2.0;
    let var = n1f * n2f / 12.0 * ((n + 1.0) - tie_term(&ties) / (n * (n - 1.0)));
    if var <= 0.0 {
        return f64::NAN;
    }
    let z = ((u1 - mean).abs() - 0.5).max(0.0) / var.sqrt();
    normal_two_tailed_p(z)
}

/// Compare a metric across two arms.
///
/// Paired comparisons keep only the pairs where both values are present and
/// test the differences: a paired t-test when they look normal, the Wilcoxon
/// signed-rank test otherwise. Unpaired comparisons drop missing values per arm
/// and use a pooled t-test when both arms look normal, the Mann–Whitney U test
/// otherwise.
pub fn compare_samples(x: &[f64], y: &[f64], is_paired: bool, alpha: f64) -> TestOutcome {
    let (test, p) = if is_paired {
        let (a, b): (Vec<f64>, Vec<f64>) = x
            .iter()
            .zip(y)
            .filter(|(a, b)| !a.is_nan() && !b.is_nan())
            .map(|(a, b)| (*a, *b))
            .unzip();
        if a.len() < 2 {
            return TestOutcome::not_applicable();
        }
        let diff: Vec<f64> = a.iter().zip(&b).map(|(u, v)| u - v).collect();
        if is_normal(&diff) {
            (StatTest::PairedTTest, paired_t_test(&a, &b))
        } else {
            (StatTest::WilcoxonSignedRank, wilcoxon_signed_rank(&a, &b))
        }
    } else {
        let a = finite(x);
        let b = finite(y);
        if a.len() < 2 || b.len() < 2 {
            return TestOutcome::not_applicable();
        }
        if is_normal(&a) && is_normal(&b) {
            (StatTest::TwoSampleTTest, two_sample_t_test(&a, &b))
        } else {
            (StatTest::MannWhitneyU, mann_whitney_u(&a, &b))
        }
    };

    TestOutcome {
        test,
        p,
        h: if p.is_nan() { None } else { Some(p < alpha) },
    }
}
