//! Program, page and element behavior against a scripted application.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use uni_automator::program::CONSOLE;
use uni_automator::{
    Connection, DevtoolsDescriptor, ElementKind, Error, MockResult, PageId, Program,
    ProgramOptions, TargetDescriptor,
};

use common::{
    connect_runtime, dial, free_port, init_tracing, next_request, program_with, puppet,
    puppet_with, reply, send_json,
};

fn current_page() -> Value {
    json!({"id": 1, "path": "pages/index/index", "query": {"from": "a"}})
}

#[tokio::test]
async fn pages_are_identity_mapped() -> anyhow::Result<()> {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (program, _app) = program_with(puppet("h5"), move |method, _| match method {
        "App.getPageStack" => {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"pageStack": [
                {"id": 1, "path": "pages/index/index", "query": {"n": n}},
                {"id": 2, "path": "pages/detail/detail", "query": {}},
            ]}))
        }
        "App.getCurrentPage" => Ok(json!({"id": 2, "path": "pages/detail/detail", "query": {}})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let first = program.page_stack().await?;
    let second = program.page_stack().await?;
    assert_eq!(first.len(), 2);
    assert!(first[0].same(&second[0]));
    assert_eq!(first[0].query(), json!({"n": 1}));

    let current = program.current_page().await?;
    assert!(current.same(&first[1]));
    assert_eq!(current.id(), &PageId::from(2));

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn elements_are_identity_mapped_and_lookup_errors_read_as_none() -> anyhow::Result<()> {
    init_tracing();
    let (program, _app) = program_with(puppet("h5"), |method, params| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElements" => Ok(json!({"elements": [
            {"elementId": 10, "tagName": "view"},
            {"elementId": 11, "tagName": "scroll-view"},
        ]})),
        "Page.getElement" if params["selector"] == ".missing" => Err("element not found".into()),
        "Page.getElement" => Ok(json!({"elementId": 11, "tagName": "scroll-view"})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let page = program.current_page().await?;
    let all = page.select_all(".item").await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].kind(), ElementKind::ScrollView);

    let one = page.select(".scroll").await?.expect("element");
    assert!(one.same(&all[1]));
    assert!(one.as_scroll_view().is_some());
    assert!(one.as_input().is_none());

    assert!(page.select(".missing").await?.is_none());

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn element_calls_carry_ids_and_variant_overrides() -> anyhow::Result<()> {
    init_tracing();
    let (program, app) = program_with(puppet("h5"), |method, params| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElements" => Ok(json!({"elements": [
            {"elementId": 20, "tagName": "scroll-view"},
            {"elementId": 21, "tagName": "movable-view"},
            {"elementId": 22, "tagName": "switch"},
            {"elementId": 23, "tagName": "comp", "nodeId": 9},
            {"elementId": 24, "tagName": "textarea"},
            {"elementId": 25, "tagName": "video", "videoId": "v1"},
            {"elementId": 26, "tagName": "body"},
        ]})),
        "Element.callFunction" => Ok(json!({"result": params["functionName"]})),
        "Element.getProperties" => Ok(json!({"properties": [params["names"][0]]})),
        "Element.getData" => Ok(json!({"data": {"count": 1}})),
        "Element.callContextMethod" => Ok(json!({"ok": true})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let page = program.current_page().await?;
    let elements = page.select_all("*").await?;
    let [scroll, movable, switch, custom, textarea, video, root] = &elements[..] else {
        panic!("expected seven elements");
    };

    assert_eq!(scroll.property("scrollTop").await?, json!("scroll-view.scrollTop"));
    assert_eq!(movable.property("x").await?, json!("_translateX"));
    assert_eq!(switch.tap().await?, json!("switch.tap"));
    assert_eq!(
        textarea.as_input().expect("input").input("hi").await?,
        json!("textarea.input")
    );

    let custom = custom.as_custom().expect("custom");
    assert_eq!(custom.data(None).await?, json!({"count": 1}));
    video
        .as_video()
        .expect("video")
        .call_context_method("play", vec![])
        .await?;
    assert_eq!(root.tag_name(), "page");

    program.disconnect();
    let received = app.await?;

    let get_data = received
        .iter()
        .find(|r| r.method == "Element.getData")
        .expect("getData sent");
    assert_eq!(get_data.params["elementId"], 23);
    assert_eq!(get_data.params["pageId"], 1);
    assert_eq!(get_data.params["nodeId"], 9);

    let context = received
        .iter()
        .find(|r| r.method == "Element.callContextMethod")
        .expect("callContextMethod sent");
    assert_eq!(context.params["videoId"], "v1");
    assert_eq!(context.params["method"], "play");
    Ok(())
}

#[tokio::test]
async fn checked_platform_rejects_private_properties() -> anyhow::Result<()> {
    init_tracing();
    let public_reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&public_reads);
    let (program, _app) = program_with(puppet("mp-weixin"), move |method, params| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElement" => Ok(json!({"elementId": 30, "tagName": "view"})),
        "Element.getProperties" if params["names"][0] == "__propPublic" => {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"properties": [{"title": true}]}))
        }
        "Element.getProperties" => Ok(json!({"properties": ["Hello"]})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let element = program.current_page().await?.select("view").await?.expect("element");
    assert_eq!(element.property("title").await?, json!("Hello"));

    let err = element.property("secret").await.unwrap_err();
    assert!(matches!(err, Error::PropertyNotExists { ref name, .. } if name == "secret"));
    assert_eq!(public_reads.load(Ordering::SeqCst), 1);

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn longpress_without_nvue_is_touch_sequence() -> anyhow::Result<()> {
    init_tracing();
    let (program, app) = program_with(puppet("h5"), |method, _| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElement" => Ok(json!({"elementId": 40, "tagName": "view"})),
        "Element.touchstart" | "Element.touchend" => Ok(json!({})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let element = program.current_page().await?.select("view").await?.expect("element");
    element.longpress().await?;

    program.disconnect();
    let methods: Vec<_> = app.await?.into_iter().map(|r| r.method).collect();
    assert_eq!(&methods[2..], ["Element.touchstart", "Element.touchend"]);
    Ok(())
}

#[tokio::test]
async fn wait_for_selector_returns_once_matched() -> anyhow::Result<()> {
    init_tracing();
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    let (program, _app) = program_with(puppet("h5"), move |method, _| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElements" if counter.fetch_add(1, Ordering::SeqCst) < 2 => {
            Ok(json!({"elements": []}))
        }
        "Page.getElements" => Ok(json!({"elements": [{"elementId": 1, "tagName": "view"}]})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let page = program.current_page().await?;
    page.wait_for(".late").await?;
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn uni_calls_mocks_and_evaluate_shape_params() -> anyhow::Result<()> {
    init_tracing();
    let (program, app) = program_with(puppet("h5"), |method, params| match method {
        "App.callUniMethod" => Ok(json!({"result": {"platform": "ios", "echo": params["method"]}})),
        "App.mockUniMethod" => Ok(json!({})),
        "App.callFunction" => Ok(json!({"result": 42})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let info = program.system_info().await?;
    assert_eq!(info["echo"], "getSystemInfoSync");

    program
        .mock_uni_method("showToast", json!({"errMsg": "ok"}), vec![])
        .await?;
    program
        .mock_uni_method(
            "getStorageSync",
            MockResult::function("function (key) { return key }"),
            vec![json!("k")],
        )
        .await?;
    program.restore_uni_method("showToast").await?;
    assert_eq!(program.evaluate("function () { return 42 }", vec![]).await?, json!(42));

    program.disconnect();
    let received = app.await?;
    assert_eq!(received[1].params, json!({"method": "showToast", "result": {"errMsg": "ok"}}));
    assert_eq!(
        received[2].params,
        json!({
            "method": "getStorageSync",
            "functionDeclaration": "function (key) { return key }",
            "args": ["k"],
        })
    );
    assert_eq!(received[3].params, json!({"method": "showToast"}));
    Ok(())
}

#[tokio::test]
async fn screenshot_is_decoded_and_saved() -> anyhow::Result<()> {
    init_tracing();
    let (program, _app) = program_with(puppet("h5"), |method, params| match method {
        "App.captureScreenshot" => {
            assert_eq!(params["fullPage"], true);
            Ok(json!({"data": STANDARD.encode(b"png-bytes")}))
        }
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shot.png");
    program.screenshot().full_page().save(&path).await?;
    assert_eq!(std::fs::read(&path)?, b"png-bytes");

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn console_events_and_bindings_flow_from_the_app() -> anyhow::Result<()> {
    init_tracing();
    let puppet = puppet("h5");
    let (_, mut peer) = connect_runtime(&puppet).await?;
    let program = Program::new(puppet, ProgramOptions::default());

    let logs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logs);
    let subscribe = program.on(CONSOLE, move |msg| sink.lock().push(msg.clone()));
    let answer = async {
        let request = next_request(&mut peer).await?;
        assert_eq!(request["method"], "App.enableLog");
        reply(&mut peer, &request, json!({})).await
    };
    let (subscribed, answered) = tokio::join!(subscribe, answer);
    subscribed?;
    answered?;

    let args = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&args);
    let expose = program.expose_function("report", move |values: &[Value]| {
        seen.lock().extend_from_slice(values);
    });
    let answer = async {
        let request = next_request(&mut peer).await?;
        assert_eq!(request["params"], json!({"name": "report"}));
        reply(&mut peer, &request, json!({})).await
    };
    let (exposed, answered) = tokio::join!(expose, answer);
    exposed?;
    answered?;

    let err = program.expose_function("report", |_: &[Value]| {}).await.unwrap_err();
    assert!(matches!(err, Error::BindingExists { .. }));

    send_json(&mut peer, json!({"method": "App.logAdded", "params": {"type": "log", "args": ["hi"]}})).await?;
    send_json(&mut peer, json!({"method": "App.bindingCalled", "params": {"name": "report", "args": [1, 2]}})).await?;

    for _ in 0..100 {
        if !logs.lock().is_empty() && !args.lock().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(logs.lock()[0]["args"], json!(["hi"]));
    assert_eq!(*args.lock(), vec![json!(1), json!(2)]);

    program.disconnect();
    Ok(())
}

#[tokio::test]
async fn devtool_methods_prefer_the_devtool_connection() -> anyhow::Result<()> {
    init_tracing();
    let (program, runtime_app) = program_with(puppet("h5"), |method, _| match method {
        "App.getCurrentPage" => Ok(current_page()),
        other => Err(format!("runtime got {other}")),
    })
    .await?;

    let (url, accept) = devtool_listener().await?;
    let devtool = Connection::create_devtool_connection(&url, program.puppet()).await?;
    program.puppet().set_devtool_connection(devtool);
    let mut devtool_peer = accept.await??;

    let info = program.tool().get_info();
    let answer = async {
        let request = next_request_ws(&mut devtool_peer).await?;
        assert_eq!(request["method"], "Tool.getInfo");
        send_ws(&mut devtool_peer, json!({"id": request["id"], "result": {"SDKVersion": "3"}})).await
    };
    let (info, answered) = tokio::join!(info, answer);
    answered?;
    assert_eq!(info?["SDKVersion"], "3");

    // Runtime-preferred methods stay on the runtime even with a devtool.
    program.current_page().await?;

    program.disconnect();
    let methods: Vec<_> = runtime_app.await?.into_iter().map(|r| r.method).collect();
    assert_eq!(methods, ["App.getCurrentPage"]);
    Ok(())
}

#[tokio::test]
async fn function_source_strings_mock_as_declarations() -> anyhow::Result<()> {
    init_tracing();
    let (program, app) = program_with(puppet("h5"), |method, _| match method {
        "App.mockUniMethod" => Ok(json!({})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    program
        .mock_uni_method("getStorageSync", json!("function () { return 1 }"), vec![])
        .await?;
    program
        .mock_uni_method("getStorageSync", json!("  () => 1"), vec![json!("k")])
        .await?;
    program
        .mock_uni_method("getStorageSync", json!("plain text"), vec![])
        .await?;

    program.disconnect();
    let received = app.await?;
    assert_eq!(
        received[0].params,
        json!({"method": "getStorageSync", "functionDeclaration": "function () { return 1 }", "args": []})
    );
    assert_eq!(
        received[1].params,
        json!({"method": "getStorageSync", "functionDeclaration": "  () => 1", "args": ["k"]})
    );
    assert_eq!(
        received[2].params,
        json!({"method": "getStorageSync", "result": "plain text"})
    );
    Ok(())
}

#[tokio::test]
async fn dropping_handles_releases_the_puppet() -> anyhow::Result<()> {
    init_tracing();
    let puppet = puppet("h5");
    let weak = puppet.downgrade();
    let (program, app) = program_with(puppet, |method, _| match method {
        "App.getCurrentPage" => Ok(current_page()),
        "Page.getElement" => Ok(json!({"elementId": 1, "tagName": "view"})),
        "Element.getElement" => Ok(json!({"elementId": 2, "tagName": "text"})),
        other => Err(format!("unexpected {other}")),
    })
    .await?;

    let page = program.current_page().await?;
    let element = page.select(".list").await?.expect("element");
    let child = element.select(".item").await?.expect("child");
    let again = element.select(".item").await?.expect("child");
    assert!(child.same(&again));

    program.disconnect();
    app.await?;
    drop((again, child, element, page, program));
    assert!(weak.upgrade().is_none());
    Ok(())
}

#[tokio::test]
async fn remote_is_skipped_without_devtool_support() -> anyhow::Result<()> {
    init_tracing();
    let (program, app) = program_with(puppet("h5"), |method, _| Err(format!("unexpected {method}"))).await?;

    program.remote(true).await?;

    program.disconnect();
    assert!(app.await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_waits_for_device_and_runtime_reconnect() -> anyhow::Result<()> {
    init_tracing();
    let cwd = tempfile::tempdir()?;
    let target = TargetDescriptor::new(DevtoolsDescriptor::new("test-devtools").with_remote());
    let puppet = puppet_with("mp-test", target, cwd.path());

    let port = free_port().await?;
    let (runtime, first_peer) = tokio::join!(
        Connection::create_runtime_connection(port, &puppet, Duration::from_secs(5)),
        dial(port),
    );
    runtime?;
    let _first_peer = first_peer?;

    let (url, accept) = devtool_listener().await?;
    let devtool = Connection::create_devtool_connection(&url, &puppet).await?;
    puppet.set_devtool_connection(devtool);
    let mut devtool_peer = accept.await??;

    let program = Program::new(puppet, ProgramOptions::default());
    let remote = tokio::spawn({
        let program = program.clone();
        async move { program.remote(true).await }
    });

    let request = next_request_ws(&mut devtool_peer).await?;
    assert_eq!(request["method"], "Tool.enableRemoteDebug");
    assert_eq!(request["params"], json!({"auto": true}));
    send_ws(&mut devtool_peer, json!({"id": request["id"], "result": {"qrCode": "qr-data"}})).await?;
    send_ws(&mut devtool_peer, json!({"method": "Tool.onRemoteDebugConnected", "params": {}})).await?;

    // Device attached, but its runtime has not dialed back yet.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!remote.is_finished());

    let _second_peer = dial(port).await?;
    tokio::time::timeout(Duration::from_secs(5), remote).await???;

    program.disconnect();
    Ok(())
}

/// Devtool peer, accepted by the test (the library dials it).
type ServerPeer = WebSocketStream<TcpStream>;

/// Listens for one devtool dial; returns its URL and the accepted peer.
async fn devtool_listener() -> anyhow::Result<(String, JoinHandle<anyhow::Result<ServerPeer>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://127.0.0.1:{}", listener.local_addr()?.port());
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let peer = tokio_tungstenite::accept_async(stream).await?;
        anyhow::Ok(peer)
    });
    Ok((url, accept))
}

async fn next_request_ws(peer: &mut ServerPeer) -> anyhow::Result<Value> {
    loop {
        let frame = peer
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("devtool peer ended"))??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

async fn send_ws(peer: &mut ServerPeer, body: Value) -> anyhow::Result<()> {
    peer.send(Message::Text(body.to_string().into())).await?;
    Ok(())
}
