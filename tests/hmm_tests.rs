mod common;

use phoneloop::consts::WORST_SCORE;
use phoneloop::hmm::Hmm;
use phoneloop::tmat::TransitionModel;

#[test]
fn test_left_to_right_propagation() {
    let tmat = common::left_to_right_tmat(1);
    let mut hmm = Hmm::new(0, vec![0, 1, 2]);
    hmm.enter(0, Some(7), 0);
    let senscr = [10, 10, 10];

    assert_eq!(hmm.vit_eval(tmat.matrix(0), &senscr), -10);
    assert_eq!(hmm.score(0), -10);
    assert_eq!(hmm.score(1), -50);
    assert_eq!(hmm.history(1), Some(7));

    assert_eq!(hmm.vit_eval(tmat.matrix(0), &senscr), -20);
    assert_eq!(hmm.score(1), -60);
    assert_eq!(hmm.score(2), -100);

    hmm.vit_eval(tmat.matrix(0), &senscr);
    assert_eq!(hmm.out_score(), -150);
    assert_eq!(hmm.out_history(), Some(7));
    assert_eq!(hmm.best_score(), -30);
}

#[test]
fn test_skip_transition_reaches_last_state() {
    let mut costs = common::LEFT_TO_RIGHT.to_vec();
    costs[2] = 10; // 0 -> 2
    let tmat = TransitionModel::from_costs(3, costs).unwrap();
    let mut hmm = Hmm::new(0, vec![0, 0, 0]);
    hmm.enter(0, None, 0);
    hmm.vit_eval(tmat.matrix(0), &[0]);
    assert_eq!(hmm.score(2), -10);
    assert_eq!(hmm.score(1), -40);
}

#[test]
fn test_disallowed_self_loop_is_skipped() {
    let mut costs = common::LEFT_TO_RIGHT.to_vec();
    costs[0] = 255; // no 0 -> 0
    let tmat = TransitionModel::from_costs(3, costs).unwrap();
    let mut hmm = Hmm::new(0, vec![0, 0, 0]);
    hmm.enter(0, None, 0);
    hmm.vit_eval(tmat.matrix(0), &[0]);
    assert_eq!(hmm.score(0), WORST_SCORE);
    assert_eq!(hmm.score(1), -40);
}

#[test]
fn test_normalize_skips_dead_states() {
    let tmat = common::left_to_right_tmat(1);
    let mut hmm = Hmm::new(0, vec![0, 1, 2]);
    hmm.enter(-1000, None, 0);
    hmm.vit_eval(tmat.matrix(0), &[0, 0, 0]);
    hmm.normalize(-1000);
    assert_eq!(hmm.score(0), 0);
    assert_eq!(hmm.score(1), -40);
    assert_eq!(hmm.best_score(), 0);
    // exit state is still unreachable after one frame
    assert!(hmm.out_score() <= WORST_SCORE);
}

#[test]
fn test_clear_deactivates() {
    let mut hmm = Hmm::new(0, vec![0, 1, 2]);
    hmm.enter(0, Some(1), 4);
    assert!(hmm.is_active(4));
    assert!(!hmm.is_active(5));
    hmm.clear();
    assert_eq!(hmm.frame(), -1);
    assert_eq!(hmm.in_score(), WORST_SCORE);
    assert_eq!(hmm.history(0), None);
}
