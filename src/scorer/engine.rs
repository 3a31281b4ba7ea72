use super::gauden::GaussianCodebooks;
use super::types::TopNEntry;
use super::SenoneScorer;
use crate::consts::{MAX_NEG_ASCR, MAX_NEG_MIXW, SENSCR_SHIFT, WORST_SCORE};

/// Log-likelihood of `x` under one density. Stops accumulating once the
/// partial sum drops below `floor`, since it can only decrease.
#[inline(always)]
fn density_score(mean: &[f32], ivar: &[f32], det: f32, x: &[f32], floor: f32) -> f32 {
    let mut d = det;
    for ((&xi, &m), &v) in x.iter().zip(mean).zip(ivar) {
        let diff = xi - m;
        d -= diff * diff * v;
        if d < floor {
            break;
        }
    }
    d
}

#[inline(always)]
fn to_score(d: f32) -> i32 {
    (d as i32).max(WORST_SCORE)
}

/// Re-scores the densities already in the list and restores its order.
fn eval_topn(list: &mut [TopNEntry], g: &GaussianCodebooks, cb: usize, feat: usize, x: &[f32]) {
    for e in list.iter_mut() {
        let cw = e.cw as usize;
        let d = density_score(
            g.mean(cb, feat, cw),
            g.inv_var(cb, feat, cw),
            g.det(cb, feat, cw),
            x,
            f32::NEG_INFINITY,
        );
        e.score = to_score(d);
    }
    // insertion sort, lists are tiny
    for i in 1..list.len() {
        let mut j = i;
        while j > 0 && list[j].beats(&list[j - 1]) {
            list.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Scans the rest of the codebook for densities that beat the current worst.
fn eval_cb(list: &mut [TopNEntry], g: &GaussianCodebooks, cb: usize, feat: usize, x: &[f32]) {
    let last = list.len() - 1;
    for cw in 0..g.n_density() {
        let cw32 = cw as u32;
        if list.iter().any(|e| e.cw == cw32) {
            continue;
        }
        let worst = list[last];
        // Anything a full unit below the worst truncates below it too.
        let d = density_score(
            g.mean(cb, feat, cw),
            g.inv_var(cb, feat, cw),
            g.det(cb, feat, cw),
            x,
            worst.score as f32 - 1.0,
        );
        let cand = TopNEntry {
            cw: cw32,
            score: to_score(d),
            cost: 0,
        };
        if !cand.beats(&worst) {
            continue;
        }
        list[last] = cand;
        let mut j = last;
        while j > 0 && list[j].beats(&list[j - 1]) {
            list.swap(j, j - 1);
            j -= 1;
        }
    }
}

pub(super) fn codebook_eval<F: AsRef<[f32]>>(s: &mut SenoneScorer, features: &[F], frame: i32) {
    let g = &*s.codebooks;
    let n_feat = g.n_feat();
    let k = s.max_topn;

    for cb in 0..g.n_mgau() {
        if !s.cb_active[cb] {
            continue;
        }
        for (f, x) in features.iter().enumerate() {
            let start = (cb * n_feat + f) * k;
            eval_topn(&mut s.topn[start..start + k], g, cb, f, x.as_ref());
        }
    }

    // Downsampled frames only track the previous top-N.
    let ds_ratio = i64::try_from(s.ds_ratio).unwrap_or(i64::MAX);
    if i64::from(frame).rem_euclid(ds_ratio) != 0 {
        return;
    }

    for cb in 0..g.n_mgau() {
        if !s.cb_active[cb] {
            continue;
        }
        for (f, x) in features.iter().enumerate() {
            let start = (cb * n_feat + f) * k;
            eval_cb(&mut s.topn[start..start + k], g, cb, f, x.as_ref());
        }
    }
}

/// Converts each active list to costs relative to the stream's best density.
pub(super) fn codebook_norm(s: &mut SenoneScorer) {
    let n_mgau = s.codebooks.n_mgau();
    let n_feat = s.codebooks.n_feat();
    let k = s.max_topn;

    for f in 0..n_feat {
        let norm = (0..n_mgau)
            .filter(|&cb| s.cb_active[cb])
            .map(|cb| s.topn[(cb * n_feat + f) * k].score >> SENSCR_SHIFT)
            .max();
        let Some(norm) = norm else {
            continue;
        };
        for cb in (0..n_mgau).filter(|&cb| s.cb_active[cb]) {
            let start = (cb * n_feat + f) * k;
            for e in &mut s.topn[start..start + k] {
                e.cost = (norm - (e.score >> SENSCR_SHIFT)).min(MAX_NEG_ASCR);
            }
        }
    }
}

/// Decodes the senone list, combines top-N costs with mixture weights and
/// writes best-relative, clamped scores.
pub(super) fn senone_eval(s: &mut SenoneScorer, active: Option<&[u8]>) {
    let n_sen = s.mixw.n_sen();
    let n_feat = s.codebooks.n_feat();
    let k = s.max_topn;

    s.scores.fill(0);
    s.senones.clear();
    match active {
        None => s.senones.extend(0..n_sen),
        Some(deltas) => {
            let mut sen = 0usize;
            for &d in deltas {
                sen += d as usize;
                if sen < n_sen {
                    s.senones.push(sen);
                }
            }
        }
    }

    let mut best = i32::MAX;
    let mut best_sen = None;
    for idx in 0..s.senones.len() {
        let sen = s.senones[idx];
        let cb = s.sen2cb[sen] as usize;

        if !s.cb_active[cb] {
            for e in &mut s.topn[cb * n_feat * k..(cb + 1) * n_feat * k] {
                e.cost = MAX_NEG_MIXW;
            }
        }

        let mut ascore = 0i32;
        for f in 0..n_feat {
            let start = (cb * n_feat + f) * k;
            let mut fden = 0;
            for (j, e) in s.topn[start..start + k].iter().enumerate() {
                let v = s.mixw.cost(f, e.cw as usize, sen) + e.cost;
                fden = if j == 0 {
                    v
                } else {
                    s.lmath_8b.fast_add_cost(fden, v)
                };
            }
            ascore = ascore.saturating_add(fden);
        }

        if ascore < best {
            best = ascore;
            best_sen = Some(sen);
        }
        s.raw[sen] = ascore;
    }

    for &sen in &s.senones {
        let rel = s.raw[sen].saturating_sub(best);
        s.scores[sen] = rel.clamp(0, i16::MAX as i32) as i16;
    }
    s.best_raw = if best_sen.is_some() { best } else { 0 };
    s.best_senone = best_sen;
}
