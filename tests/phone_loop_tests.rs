mod common;

use common::ScriptedSource;
use phoneloop::config::PhoneLoopParams;
use phoneloop::consts::WORST_SCORE;
use phoneloop::error::DecodeError;
use phoneloop::phones::PhoneSet;
use phoneloop::search::{PhoneLoopSearch, Search, SearchState};
use proptest::prelude::*;
use rstest::rstest;
use std::sync::Arc;

fn build(names: &[&str], params: &PhoneLoopParams) -> PhoneLoopSearch {
    let lmath = common::model_lmath();
    let tmat = Arc::new(common::left_to_right_tmat(names.len()));
    PhoneLoopSearch::new(params, &lmath, tmat, PhoneSet::context_independent(names, 3)).unwrap()
}

fn wide_params(weight: f64, window: usize) -> PhoneLoopParams {
    PhoneLoopParams {
        pl_beam: 1e-200,
        pl_pbeam: 1e-200,
        pl_pip: 1.0,
        pl_weight: weight,
        pl_window: window,
    }
}

// --- END TO END ---

#[test]
fn test_penalties_follow_the_matching_phone() {
    common::init_tracing();
    let mut search = build(&["a", "b", "c"], &wide_params(3.0, 2));

    // b matches frames 0-2, c matches frames 3-4
    let mut frames = ScriptedSource::favoring(9, &[3, 4, 5], 20, 3);
    frames.extend(ScriptedSource::favoring(9, &[6, 7, 8], 200, 2));
    let mut source = ScriptedSource::new(9, frames);

    search.start().unwrap();
    let mut bests = Vec::new();
    for t in 0..5 {
        search.step(t, &mut source).unwrap();
        bests.push(search.best_score());
        if t < 3 {
            assert!(search.penalty(1) > search.penalty(2), "frame {t}");
            assert_eq!(search.penalty(1), Some(0));
        }
    }

    assert!(search.penalty(2) > search.penalty(1));
    assert_eq!(search.penalties(), &[-600, -420, 0]);
    assert_eq!(bests, vec![0, 0, 0, -60, -60]);
    assert!(bests.windows(2).all(|w| w[1].abs() >= w[0].abs()));
    assert!(search.renorm_events().is_empty());
    assert_eq!(search.frame_idx(), 5);
    assert!(source.active.iter().all(|&a| a));
}

#[test]
fn test_penalty_window_uses_only_filled_rows() {
    let mut search = build(&["a", "b"], &wide_params(1.0, 5));
    let frames = ScriptedSource::favoring(6, &[3, 4, 5], 20, 4);
    let mut source = ScriptedSource::new(6, frames);
    search.start().unwrap();

    search.step(0, &mut source).unwrap();
    assert_eq!(search.penalty(0), Some(-20));
    search.step(1, &mut source).unwrap();
    assert_eq!(search.penalty(0), Some(-20));
}

#[test]
fn test_penalty_window_forgets_old_rows() {
    let mut search = build(&["a", "b"], &wide_params(1.0, 2));
    let frames = ScriptedSource::favoring(6, &[3, 4, 5], 20, 4);
    let mut source = ScriptedSource::new(6, frames);
    search.start().unwrap();

    let mut seen = Vec::new();
    for t in 0..4 {
        search.step(t, &mut source).unwrap();
        seen.extend(search.penalty(0));
    }
    assert_eq!(seen, vec![-20, -20, -40, -60]);
    assert!(search.penalties()[1] == 0);
}

// --- THRESHOLDS ---

#[test]
fn test_default_thresholds() {
    let search = build(&["a"], &PhoneLoopParams::default());
    assert_eq!(search.beam(), -225);
    assert_eq!(search.pbeam(), -225);
    assert_eq!(search.pip(), 0);
    assert_eq!(search.window(), 5);
}

#[rstest]
#[case(PhoneLoopParams { pl_window: 0, ..Default::default() })]
#[case(PhoneLoopParams { pl_weight: 0.0, ..Default::default() })]
#[case(PhoneLoopParams { pl_beam: 0.0, ..Default::default() })]
#[case(PhoneLoopParams { pl_pip: 1.5, ..Default::default() })]
fn test_invalid_params_are_rejected(#[case] params: PhoneLoopParams) {
    let lmath = common::model_lmath();
    let tmat = Arc::new(common::left_to_right_tmat(1));
    let res = PhoneLoopSearch::new(&params, &lmath, tmat, PhoneSet::context_independent(&["a"], 3));
    assert!(matches!(res.err(), Some(DecodeError::Config(_))));
}

#[rstest]
#[case(PhoneLoopParams { pl_beam: 1.0, ..Default::default() })]
#[case(PhoneLoopParams { pl_beam: 0.99995, ..Default::default() })]
#[case(PhoneLoopParams { pl_pbeam: 1.0, ..Default::default() })]
fn test_beams_that_quantize_to_zero_are_rejected(#[case] params: PhoneLoopParams) {
    assert!(params.validate().is_ok());
    let lmath = common::model_lmath();
    let tmat = Arc::new(common::left_to_right_tmat(1));
    let res = PhoneLoopSearch::new(&params, &lmath, tmat, PhoneSet::context_independent(&["a"], 3));
    assert!(matches!(res.err(), Some(DecodeError::Config(_))));
}

#[test]
fn test_phone_set_must_fit_the_model() {
    let lmath = common::model_lmath();
    let tmat = Arc::new(common::left_to_right_tmat(1));
    let res = PhoneLoopSearch::new(
        &PhoneLoopParams::default(),
        &lmath,
        tmat,
        PhoneSet::context_independent(&["a", "b"], 3),
    );
    assert!(matches!(res.err(), Some(DecodeError::Dimension(_))));
}

// --- PRUNING ---

fn survivors_after_first_frame(beam: f64, costs: &[i16]) -> usize {
    let n = costs.len();
    let names: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let params = PhoneLoopParams {
        pl_beam: beam,
        ..Default::default()
    };
    let mut search = build(&names, &params);
    let row: Vec<i16> = costs.iter().flat_map(|&c| [c, c, c]).collect();
    let mut source = ScriptedSource::new(3 * n, vec![row]);
    search.start().unwrap();
    search.step(0, &mut source).unwrap();
    (0..n)
        .filter_map(|i| search.hmm(i))
        .filter(|h| h.is_active(1))
        .count()
}

proptest! {
    #[test]
    fn prop_wider_beam_never_prunes_more(
        costs in proptest::collection::vec(0i16..3000, 2..8),
        narrow in 1i32..100,
        extra in 0i32..100,
    ) {
        let tight = survivors_after_first_frame(10f64.powi(-narrow), &costs);
        let loose = survivors_after_first_frame(10f64.powi(-(narrow + extra)), &costs);
        prop_assert!(tight >= 1);
        prop_assert!(loose >= tight);
    }
}

proptest! {
    #[test]
    fn prop_survivors_are_inside_the_beam(
        rows in proptest::collection::vec(proptest::collection::vec(0i16..4000, 12), 1..10),
        beam_exp in 1i32..60,
        pip in prop_oneof![Just(1.0), Just(1e-300)],
    ) {
        let params = PhoneLoopParams {
            pl_beam: 10f64.powi(-beam_exp),
            pl_pip: pip,
            ..Default::default()
        };
        let mut search = build(&["a", "b", "c", "d"], &params);
        let n = rows.len();
        let mut source = ScriptedSource::new(12, rows);
        search.start().unwrap();

        for t in 0..n as i32 {
            search.step(t, &mut source).unwrap();
            let thresh = search.best_score() as i64 + search.beam() as i64;
            let hmms: Vec<_> = (0..search.n_phones()).filter_map(|i| search.hmm(i)).collect();

            // the best phone always survives
            prop_assert!(hmms
                .iter()
                .any(|h| h.best_score() == search.best_score() && h.is_active(t + 1)));
            for h in &hmms {
                if h.best_score() > WORST_SCORE {
                    // kept by pruning: strictly inside the beam
                    prop_assert!(h.best_score() as i64 > thresh);
                    prop_assert!(h.is_active(t + 1));
                } else {
                    // pruned or never reached; alive again only through a transition
                    prop_assert!(!h.is_active(t + 1) || h.in_score() > WORST_SCORE);
                }
            }
        }
    }
}

// --- RENORMALIZATION ---

#[test]
fn test_scores_are_renormalized_before_underflow() {
    // Widest beam, and a per-frame loss under twice its width, so the
    // trigger fires before any live score reaches the floor.
    let params = PhoneLoopParams {
        pl_beam: 1e-300,
        ..Default::default()
    };
    let mut search = build(&["a", "b", "c"], &params);
    let mut source = ScriptedSource::constant(9, 13_000, 42_000);
    search.start().unwrap();

    let mut t = 0;
    while search.renorm_events().is_empty() {
        assert!(t < 42_000, "no renormalization");
        search.step(t, &mut source).unwrap();
        t += 1;
    }

    let events = search.renorm_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].frame, t - 1);
    assert_eq!(events[0].norm, -13_000 * (t - 1));
    assert!(events[0].norm as i64 + 2 * (search.beam() as i64) < WORST_SCORE as i64);
    assert_eq!(search.best_score(), -13_000);
    assert!(search.penalties().iter().all(|&p| p == 0));
}

// --- STATE MACHINE ---

#[test]
fn test_state_transitions() {
    let mut search = build(&["a", "b"], &PhoneLoopParams::default());
    let mut source = ScriptedSource::constant(6, 0, 3);
    assert_eq!(search.state(), SearchState::Uninitialized);
    assert_eq!(search.state().to_string(), "uninitialized");
    assert_eq!("finished".parse::<SearchState>().unwrap(), SearchState::Finished);

    let err = search.step(0, &mut source).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidState(_)));
    assert!(matches!(search.finish(), Err(DecodeError::InvalidState(_))));

    search.start().unwrap();
    assert_eq!(search.state(), SearchState::Running);
    search.step(0, &mut source).unwrap();

    // repeated and skipped frames
    assert!(matches!(search.step(0, &mut source), Err(DecodeError::InvalidState(_))));
    assert!(matches!(search.step(2, &mut source), Err(DecodeError::InvalidState(_))));
    search.step(1, &mut source).unwrap();

    search.finish().unwrap();
    assert_eq!(search.state(), SearchState::Finished);
    assert!(matches!(search.step(2, &mut source), Err(DecodeError::InvalidState(_))));

    search.start().unwrap();
    assert_eq!(search.frame_idx(), 0);
    assert_eq!(search.penalties(), &[0, 0]);
    search.step(0, &mut source).unwrap();
}

#[test]
fn test_missing_frame_is_propagated() {
    let mut search = build(&["a"], &PhoneLoopParams::default());
    let mut source = ScriptedSource::constant(3, 0, 1);
    search.start().unwrap();
    search.step(0, &mut source).unwrap();
    let err = search.step(1, &mut source).unwrap_err();
    assert!(matches!(err, DecodeError::FrameUnavailable(1)));
}

#[test]
fn test_senone_range_is_checked_against_source() {
    let mut search = build(&["a", "b"], &PhoneLoopParams::default());
    let mut source = ScriptedSource::constant(4, 0, 1);
    search.start().unwrap();
    let err = search.step(0, &mut source).unwrap_err();
    assert!(matches!(err, DecodeError::Dimension(_)));
}

#[test]
fn test_start_resets_every_hmm() {
    let mut search = build(&["a", "b"], &PhoneLoopParams::default());
    search.start().unwrap();
    for i in 0..search.n_phones() {
        let hmm = search.hmm(i).unwrap();
        assert_eq!(hmm.in_score(), 0);
        assert_eq!(hmm.history(0), None);
        assert!(hmm.is_active(0));
        assert_eq!(hmm.score(1), WORST_SCORE);
    }
}

#[test]
fn test_reinit_requires_restart() {
    let mut search = build(&["a", "b"], &PhoneLoopParams::default());
    search.start().unwrap();
    search
        .reinit(
            Arc::new(common::left_to_right_tmat(3)),
            PhoneSet::context_independent(&["a", "b", "c"], 3),
        )
        .unwrap();
    assert_eq!(search.n_phones(), 3);
    assert_eq!(search.state(), SearchState::Uninitialized);
    assert_eq!(search.penalties().len(), 3);
}

#[test]
fn test_out_of_range_phone_lookups_are_none() {
    let search = build(&["a", "b"], &PhoneLoopParams::default());
    assert!(search.hmm(1).is_some());
    assert!(search.hmm(2).is_none());
    assert_eq!(search.penalty(1), Some(0));
    assert_eq!(search.penalty(2), None);
}

// --- UNSUPPORTED ---

#[test]
fn test_hypothesis_queries_are_unsupported() {
    let search = build(&["a"], &PhoneLoopParams::default());
    assert_eq!(search.name(), "phone_loop");
    assert!(matches!(search.hyp(), Err(DecodeError::Unsupported(_))));
    assert!(matches!(search.prob(), Err(DecodeError::Unsupported(_))));
    assert!(matches!(search.segments(), Err(DecodeError::Unsupported(_))));
}
