use super::*;
use crate::context::HandlerContext;
use hermes_core::PKey;
use serde_json::json;

#[tokio::test]
async fn all_transitions_are_ok_and_leave_context_untouched() {
    let handler = NoopHandler::new();
    let mut ctx = HandlerContext::default();
    let attrs = crate::handler::Attrs::new();
    let pkey = PKey::single(json!("x"));
    handler.on_added(&pkey, &attrs, &mut ctx).await.unwrap();
    handler.on_modified(&pkey, &attrs, &attrs, &mut ctx).await.unwrap();
    handler.on_removed(&pkey, &attrs, &mut ctx).await.unwrap();
    handler.on_trashed(&pkey, &attrs, &mut ctx).await.unwrap();
    handler.on_recycled(&pkey, &attrs, &mut ctx).await.unwrap();
    handler.on_save().await.unwrap();
    assert_eq!(ctx.step, 0);
}
