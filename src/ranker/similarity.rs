//! Pure similarity-measure functions (spec.md §4.10). Each takes the
//! collection/document statistics a conjunct's traversal has in hand and
//! returns one document's contribution to that conjunct's score; the
//! ranker sums contributions across conjuncts. Constants (k1, b, mu, ...)
//! are tunable; the ranking semantics they express are not.

/// Okapi BM25, the default metric.
pub fn okapi_bm25(f_t: u32, n_docs: u32, tf: u32, dl: u32, avdl: f64, qtf: u32, k1: f64, k3: f64, b: f64) -> f64 {
    let n = n_docs as f64;
    let f_t = f_t as f64;
    let idf = ((n - f_t + 0.5) / (f_t + 0.5)).ln();
    let k = k1 * ((1.0 - b) + b * dl as f64 / avdl.max(1.0));
    let tf_component = (k1 + 1.0) * tf as f64 / (k + tf as f64);
    let qtf_component = (k3 + 1.0) * qtf as f64 / (k3 + qtf as f64);
    idf * tf_component * qtf_component
}

/// tf-idf cosine, normalized against the document's precomputed vector
/// weight (docmap's `weight` column, `load.docmap-cache` permitting;
/// callers fall back to 1.0 when that column isn't resident).
pub fn cosine(f_t: u32, n_docs: u32, tf: u32, doc_weight: f64) -> f64 {
    let idf = (n_docs as f64 / f_t.max(1) as f64).ln();
    let w_td = 1.0 + (tf as f64).ln();
    (idf * w_td) / doc_weight.max(1e-9)
}

/// Cosine with pivoted length normalization (Singhal et al.): trades the
/// raw document-weight normalizer for one derived from `dl`/`avdl`, so it
/// doesn't need the docmap's weight column at all.
pub fn pivoted_cosine(f_t: u32, n_docs: u32, tf: u32, dl: u32, avdl: f64, pivot: f64) -> f64 {
    let idf = ((n_docs as f64 + 1.0) / f_t.max(1) as f64).ln();
    let norm = (1.0 - pivot) + pivot * (dl as f64 / avdl.max(1.0));
    idf * (1.0 + (tf as f64).ln()) / norm.max(1e-9)
}

/// Dirichlet-smoothed query-likelihood language model.
pub fn dirichlet(tf: u32, dl: u32, big_f_t: u64, total_terms: u64, mu: f64) -> f64 {
    let p_tc = (big_f_t as f64 / total_terms.max(1) as f64).max(1e-12);
    ((tf as f64 + mu * p_tc) / (dl as f64 + mu)).ln()
}

/// BM25 variant with the term-frequency saturation curve replaced by an
/// `alpha`-power rescaling and `k3` taken to infinity (so the query-term
/// frequency factor degenerates to 1, matching single-occurrence queries).
pub fn hawkapi(f_t: u32, n_docs: u32, tf: u32, dl: u32, avdl: f64, alpha: f64, k1: f64, b: f64) -> f64 {
    let n = n_docs as f64;
    let f_t = f_t as f64;
    let idf = ((n - f_t + 0.5) / (f_t + 0.5)).ln();
    let k = k1 * ((1.0 - b) + b * dl as f64 / avdl.max(1.0));
    let scaled_tf = (tf as f64).powf(alpha);
    idf * (k1 + 1.0) * scaled_tf / (k + scaled_tf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bm25_rewards_rare_terms_over_common_ones() {
        let rare = okapi_bm25(2, 1000, 5, 100, 100.0, 1, 1.2, 1e10, 0.75);
        let common = okapi_bm25(800, 1000, 5, 100, 100.0, 1, 1.2, 1e10, 0.75);
        assert!(rare > common);
    }

    #[test]
    fn bm25_saturates_with_increasing_tf() {
        let low = okapi_bm25(10, 1000, 1, 100, 100.0, 1, 1.2, 1e10, 0.75);
        let high = okapi_bm25(10, 1000, 50, 100, 100.0, 1, 1.2, 1e10, 0.75);
        let higher = okapi_bm25(10, 1000, 500, 100, 100.0, 1, 1.2, 1e10, 0.75);
        assert!(high > low);
        assert!(higher - high < high - low);
    }

    #[test]
    fn cosine_penalizes_heavier_documents() {
        let light = cosine(10, 1000, 3, 1.0);
        let heavy = cosine(10, 1000, 3, 4.0);
        assert!(light > heavy);
    }

    #[test]
    fn dirichlet_favors_higher_term_frequency() {
        let low = dirichlet(1, 100, 500, 100_000, 2000.0);
        let high = dirichlet(10, 100, 500, 100_000, 2000.0);
        assert!(high > low);
    }

    #[test]
    fn hawkapi_alpha_one_tracks_bm25_ordering() {
        let rare = hawkapi(2, 1000, 5, 100, 100.0, 1.0, 1.2, 0.75);
        let common = hawkapi(800, 1000, 5, 100, 100.0, 1.0, 1.2, 0.75);
        assert!(rare > common);
    }
}
