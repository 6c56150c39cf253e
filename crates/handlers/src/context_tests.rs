use super::*;

#[test]
fn advance_step_updates_value() {
    let mut ctx = HandlerContext::default();
    ctx.advance_step(3);
    assert_eq!(ctx.step, 3);
}

#[test]
fn mark_partially_processed_sets_flag() {
    let mut ctx = HandlerContext::default();
    assert!(!ctx.is_partially_processed);
    ctx.mark_partially_processed();
    assert!(ctx.is_partially_processed);
}
