use std::sync::Arc;

use courier::managers::local::LocalTransport;
use courier::{
    CallMode, Dispatcher, RemoteCall, RemoteError, RemoteException, Transport, async_trait,
};
use serde_json::json;

// Replies to every batch with the same canned body.
struct CannedTransport(serde_json::Value);

#[async_trait]
impl Transport for CannedTransport {
    const TRANSPORT_NAME: &'static str = "Canned";

    async fn round_trip(&self, _body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        Ok(serde_json::to_vec(&self.0).unwrap())
    }
}

fn echo_transport() -> Arc<LocalTransport> {
    let transport = Arc::new(LocalTransport::default());
    transport.register("echo", |args| Ok(args["value"].clone()));
    transport.register("explode", |_| {
        Err(RemoteException::new("Invalid parameter value detected").with_errorcode("invalidparameter"))
    });
    transport
}

fn echo(value: i64) -> RemoteCall {
    RemoteCall::new("echo").arg("value", value)
}

#[tokio::test]
async fn test_all_calls_resolve_in_order_with_one_round_trip() {
    let transport = echo_transport();
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    let handles = dispatcher.call(vec![echo(10), echo(20), echo(30)], CallMode::Async);
    assert_eq!(
        handles.iter().map(|h| h.index()).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }
    assert_eq!(values, vec![json!(10), json!(20), json!(30)]);
    assert_eq!(transport.round_trips(), 1);

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[tokio::test]
async fn test_failed_call_rejects_every_later_call() {
    let transport = echo_transport();
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    let mut handles = dispatcher
        .call(
            vec![echo(1), RemoteCall::new("explode"), echo(3), echo(4)],
            CallMode::Async,
        )
        .into_iter();

    assert_eq!(handles.next().unwrap().await, Ok(json!(1)));
    for handle in handles {
        let err = handle.await.unwrap_err();
        assert_eq!(
            err.exception().and_then(|e| e.errorcode.as_deref()),
            Some("invalidparameter")
        );
    }
}

#[tokio::test]
async fn test_later_success_cannot_undo_earlier_failure() {
    let dispatcher = Dispatcher::on_current_runtime(CannedTransport(json!([
        {"error": false, "data": "a"},
        {"error": true, "exception": {"message": "boom"}},
        {"error": false, "data": "c"}
    ])));

    let handles = dispatcher.call(vec![echo(1), echo(2), echo(3)], CallMode::Async);
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await);
    }

    assert_eq!(outcomes[0], Ok(json!("a")));
    assert_eq!(
        outcomes[1],
        Err(RemoteError::Exception(RemoteException::new("boom")))
    );
    assert_eq!(outcomes[2], outcomes[1]);
}

#[tokio::test]
async fn test_missing_tail_is_rejected() {
    let dispatcher =
        Dispatcher::on_current_runtime(CannedTransport(json!([{"error": false, "data": 1}])));

    let handles = dispatcher.call(vec![echo(1), echo(2), echo(3)], CallMode::Async);
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await);
    }

    assert_eq!(outcomes[0], Ok(json!(1)));
    assert_eq!(outcomes[1], Err(RemoteError::MissingResponse { index: 1 }));
    assert_eq!(outcomes[2], Err(RemoteError::MissingResponse { index: 1 }));
}

#[tokio::test]
async fn test_transport_failure_rejects_whole_batch() {
    let transport = echo_transport();
    transport.fail_with(RemoteError::Transport("connection refused".to_string()));
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    for handle in dispatcher.call(vec![echo(1), echo(2)], CallMode::Async) {
        assert_eq!(
            handle.await,
            Err(RemoteError::Transport("connection refused".to_string()))
        );
    }

    transport.clear_failure();
    assert_eq!(dispatcher.call_one(echo(5)).await, Ok(json!(5)));
    assert_eq!(transport.round_trips(), 2);
}

#[tokio::test]
async fn test_unparseable_body_is_a_transport_failure() {
    let dispatcher = Dispatcher::on_current_runtime(CannedTransport(json!("not an array")));

    let handle = dispatcher.call_one(echo(1));
    assert!(matches!(handle.await, Err(RemoteError::Transport(_))));
}

#[tokio::test]
async fn test_empty_batch_sends_nothing() {
    let transport = echo_transport();
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    assert!(dispatcher.call(Vec::new(), CallMode::Async).is_empty());
    assert_eq!(transport.round_trips(), 0);
}

#[tokio::test]
async fn test_concurrent_batches_are_independent() {
    let transport = echo_transport();
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    let failing = dispatcher.call(vec![RemoteCall::new("explode"), echo(1)], CallMode::Async);
    let passing = dispatcher.call(vec![echo(2), echo(3)], CallMode::Async);

    for handle in passing {
        assert!(handle.await.is_ok());
    }
    for handle in failing {
        assert!(handle.await.is_err());
    }
    assert_eq!(transport.round_trips(), 2);
}

#[test]
fn test_blocking_mode_settles_before_returning() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let transport = echo_transport();
    let dispatcher = Dispatcher::new(Arc::clone(&transport), runtime.handle().clone());

    let mut handles = dispatcher.call(vec![echo(7), echo(8)], CallMode::Blocking);

    assert_eq!(handles[0].try_result(), Some(&Ok(json!(7))));
    assert_eq!(handles[1].try_result(), Some(&Ok(json!(8))));
    // Inspecting does not consume the outcome
    let second = handles.pop().unwrap();
    assert_eq!(runtime.block_on(second.wait()), Ok(json!(8)));
}

#[tokio::test]
async fn test_typed_payload() {
    let dispatcher = Dispatcher::on_current_runtime(echo_transport());

    let value: i64 = dispatcher.call_one(echo(42)).wait_as().await.unwrap();
    assert_eq!(value, 42);

    let wrong: Result<String, _> = dispatcher.call_one(echo(42)).wait_as().await;
    assert!(matches!(wrong, Err(RemoteError::Serialization(_))));
}

#[tokio::test]
async fn test_taking_batches_empties_the_record() {
    let transport = echo_transport();
    let dispatcher = Dispatcher::on_current_runtime(Arc::clone(&transport));

    dispatcher.call_one(echo(1)).await.unwrap();
    dispatcher.call_one(echo(2)).await.unwrap();

    let taken = transport.take_batches();
    assert_eq!(taken.len(), 2);
    assert_eq!(taken[1][0].args["value"], json!(2));
    assert!(transport.batches().is_empty());
    assert_eq!(transport.round_trips(), 2);
}
