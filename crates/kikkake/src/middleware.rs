//! Onion composition of HTTP middleware around a step handler.

use kikkake_core::{FlowContext, Middleware, Next, StepError, StepHandler, TriggerInput};

/// Wraps `handler` in `middleware`, first entry outermost.
///
/// The returned [`Next`] runs the whole chain for one request. The
/// innermost link calls the handler and converts its output into an
/// HTTP response.
pub fn compose(middleware: &[Middleware], ctx: &FlowContext, handler: StepHandler) -> Next {
    let handler_ctx = ctx.clone();
    let mut next = Next::new(move |request| {
        Box::pin(async move {
            let output = handler.call(TriggerInput::Http(request), handler_ctx).await?;
            Ok::<_, StepError>(output.into_response())
        })
    });

    for layer in middleware.iter().rev() {
        let layer = layer.clone();
        let ctx = ctx.clone();
        let inner = next;
        next = Next::new(move |request| Box::pin(async move { layer.call(request, ctx, inner).await }));
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use kikkake_core::{ApiRequest, ApiResponse, TriggerKind};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn recording_layer(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Middleware {
        Middleware::new(move |req, _ctx, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{name}:before"));
                let response = next.run(req).await;
                log.lock().push(format!("{name}:after"));
                response
            }
        })
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let handler = StepHandler::new(move |_input, _ctx| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().push("handler".to_string());
                Ok::<_, StepError>(json!({"ok": true}))
            }
        });

        let chain = compose(
            &[recording_layer("outer", log.clone()), recording_layer("inner", log.clone())],
            &FlowContext::detached(TriggerKind::Http),
            handler,
        );
        let response = chain.run(ApiRequest::new("GET", "/")).await.unwrap();

        assert_eq!(response, ApiResponse::ok(json!({"ok": true})));
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_rewrite_request() {
        let add_user = Middleware::new(|req: ApiRequest, _ctx, next: Next| async move {
            next.run(req.with_header("x-user", "alice")).await
        });
        let handler = StepHandler::new(|input, _ctx| async move {
            let user = input
                .as_request()
                .and_then(|req| req.header("X-User"))
                .unwrap_or_default()
                .to_string();
            Ok::<_, StepError>(json!({"user": user}))
        });

        let chain = compose(&[add_user], &FlowContext::detached(TriggerKind::Http), handler);
        let response = chain.run(ApiRequest::new("GET", "/me")).await.unwrap();
        assert_eq!(response.body, Some(json!({"user": "alice"})));
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let handler = StepHandler::new(|_input, _ctx| async move { Ok::<_, StepError>(()) });
        let chain = compose(&[], &FlowContext::detached(TriggerKind::Http), handler);
        let response = chain.run(ApiRequest::new("POST", "/")).await.unwrap();
        assert_eq!(response.status, 204);
    }
}
