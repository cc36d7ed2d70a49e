//! Island fetch, coalescing and splice scenarios.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reinhardt_app::{App, AppOptions, HookBus, IslandResponse, SsrContext};
use reinhardt_islands::{
	Island, IslandError, IslandFetcher, IslandOptions, IslandRequest, IslandResult, IslandSettings,
	TeleportTarget, replace_island_teleports,
};
use reinhardt_markers::get_uid;
use reinhardt_payload::Value;
use rstest::{fixture, rstest};
use serde_json::{Map, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct MockFetcher {
	calls: AtomicUsize,
	fail: AtomicBool,
	last_props: Mutex<Option<Map<String, serde_json::Value>>>,
}

#[async_trait]
impl IslandFetcher for MockFetcher {
	async fn fetch(&self, request: &IslandRequest) -> IslandResult<IslandResponse> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
		*self.last_props.lock() = Some(request.props.clone());
		// Give concurrent callers a chance to join this fetch.
		tokio::task::yield_now().await;
		if self.fail.load(Ordering::SeqCst) {
			return Err(IslandError::Status {
				status: 500,
				url: request.path(),
			});
		}
		Ok(IslandResponse {
			id: request.uid.clone(),
			html: format!(
				concat!(
					r#"<div nuxt-ssr-component-uid="srv"><p>{} #{}</p>"#,
					r#"<div nuxt-ssr-slot-name="default" nuxt-ssr-slot-data="{{&quot;n&quot;:1}}"></div>"#,
					r#"<div nuxt-ssr-slot-name="undeclared"></div></div>"#
				),
				request.name, call
			),
			state: json!({"island-state": call, "shared": "from-island"})
				.as_object()
				.cloned()
				.unwrap_or_default(),
			..IslandResponse::default()
		})
	}
}

#[fixture]
fn fetcher() -> Arc<MockFetcher> {
	Arc::new(MockFetcher::default())
}

fn client_app() -> App {
	App::new(AppOptions::default())
}

fn island(app: &App, fetcher: &Arc<MockFetcher>) -> Island {
	let mut options = IslandOptions::new("Card");
	options.props = json!({"id": 1}).as_object().cloned().unwrap_or_default();
	options.slots = vec!["default".into()];
	options.fallback = Some("<p>loading</p>".into());
	options.settings = IslandSettings { debounce_ms: 5 };
	Island::new(app.clone(), fetcher.clone(), options)
}

#[rstest]
#[tokio::test]
async fn test_forced_refetch_issues_a_second_call(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	let island = island(&app, &fetcher);

	island.fetch(false).await;
	let key = island.key().unwrap();
	assert!(island.html().contains("Card #1"));

	// Without force the payload entry is reused.
	island.fetch(false).await;
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

	island.fetch(true).await;
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
	assert!(island.html().contains("Card #2"));
	let entry = app.payload().read().data_get(&key).unwrap();
	let html = entry.get("html").and_then(|v| v.as_str().map(str::to_string)).unwrap();
	assert!(html.contains("Card #2"));
	assert!(entry.get("__nuxt_island").is_some());
}

#[rstest]
#[tokio::test]
async fn test_concurrent_fetches_share_one_call(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	let first = island(&app, &fetcher);
	let second = island(&app, &fetcher);

	tokio::join!(first.fetch(true), second.fetch(true));

	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
	assert!(first.html().contains("Card #1"));
	assert!(second.html().contains("Card #1"));
	// Each instance still gets its own uid.
	assert_ne!(first.uid(), second.uid());
}

#[rstest]
#[tokio::test]
async fn test_separate_apps_do_not_share_fetches(fetcher: Arc<MockFetcher>) {
	let (a, b) = (client_app(), client_app());
	let (first, second) = (island(&a, &fetcher), island(&b, &fetcher));
	tokio::join!(first.fetch(true), second.fetch(true));
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[rstest]
#[tokio::test]
async fn test_uid_is_rewritten_on_every_fetch(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	let island = island(&app, &fetcher);
	let before = island.uid();

	island.fetch(true).await;
	let first = island.uid();
	assert_ne!(first, before);
	assert_ne!(first, "srv");
	assert_eq!(get_uid(&island.html()).as_deref(), Some(first.as_str()));

	island.fetch(true).await;
	assert_ne!(island.uid(), first);
}

#[rstest]
#[tokio::test]
async fn test_island_state_does_not_overwrite_app_state(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	app.payload().read().state_insert("shared", Value::string("from-app"));
	island(&app, &fetcher).fetch(true).await;

	let payload = app.payload().read();
	assert_eq!(payload.state_get("shared"), Some(Value::string("from-app")));
	assert_eq!(payload.state_get("island-state"), Some(Value::Number(1.0)));
}

#[rstest]
#[tokio::test]
async fn test_failure_keeps_last_markup(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	let island = island(&app, &fetcher);
	island.fetch(true).await;
	let good = island.html();

	fetcher.fail.store(true, Ordering::SeqCst);
	island.refresh().await;
	assert_eq!(island.html(), good);
	assert!(matches!(island.error(), Some(IslandError::Status { status: 500, .. })));

	fetcher.fail.store(false, Ordering::SeqCst);
	island.refresh().await;
	assert!(island.error().is_none());
}

#[rstest]
#[tokio::test]
async fn test_failure_without_markup_renders_fallback(fetcher: Arc<MockFetcher>) {
	fetcher.fail.store(true, Ordering::SeqCst);
	let island = island(&client_app(), &fetcher);
	island.fetch(false).await;
	let rendered = island.render(&IndexMap::new());
	assert_eq!(rendered.html, "<p>loading</p>");
	assert!(rendered.teleports.is_empty());
	assert!(island.error().is_some());
}

#[rstest]
#[tokio::test]
async fn test_client_render_targets_live_selector(fetcher: Arc<MockFetcher>) {
	let island = island(&client_app(), &fetcher);
	island.fetch(true).await;
	let slots = IndexMap::from([("default".to_string(), "<b>child</b>".to_string())]);

	let rendered = island.render(&slots);
	assert_eq!(rendered.teleports.len(), 1);
	let teleport = &rendered.teleports[0];
	assert_eq!(teleport.slot, "default");
	assert_eq!(teleport.html, "<b>child</b>");
	assert_eq!(teleport.props, Some(json!({"n": 1})));
	assert_eq!(
		teleport.target,
		TeleportTarget::Selector(format!(
			r#"[nuxt-ssr-component-uid="{}"] [nuxt-ssr-slot-name="default"]"#,
			island.uid()
		))
	);
}

#[rstest]
#[tokio::test]
async fn test_server_render_records_and_splices_teleports(fetcher: Arc<MockFetcher>) {
	let ctx = Arc::new(SsrContext::new("/"));
	let app = App::for_render(ctx.clone(), Arc::new(HookBus::new()));
	let island = island(&app, &fetcher);
	island.fetch(false).await;

	let slots = IndexMap::from([("default".to_string(), "<b>child</b>".to_string())]);
	let rendered = island.render(&slots);
	let uid = island.uid();
	assert_eq!(
		rendered.teleports[0].target,
		TeleportTarget::Key(format!("uid={uid};slot=default"))
	);

	let page = format!("<main>{}</main>", rendered.html);
	let spliced = replace_island_teleports(&ctx, &page).unwrap();
	assert!(spliced.contains(r#"<div nuxt-ssr-slot-name="default" nuxt-ssr-slot-data="{&quot;n&quot;:1}"><b>child</b></div>"#));
	assert!(spliced.contains(r#"<div nuxt-ssr-slot-name="undeclared"></div>"#));

	// A client hydrating this payload reuses the entry instead of fetching.
	let client = App::new(AppOptions {
		payload: ctx.payload.read().clone(),
		hydrating: true,
		..AppOptions::default()
	});
	let mut options = IslandOptions::new("Card");
	options.props = json!({"id": 1}).as_object().cloned().unwrap_or_default();
	options.initial_html = Some(rendered.html.clone());
	let hydrated = Island::new(client, fetcher.clone(), options);
	assert_eq!(hydrated.uid(), uid);
	hydrated.fetch(false).await;
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_rapid_prop_updates_fetch_once(fetcher: Arc<MockFetcher>) {
	let island = island(&client_app(), &fetcher);
	let props = |id: i64| json!({"id": id}).as_object().cloned().unwrap_or_default();

	let (first, second) = tokio::join!(island.update_props(props(2)), island.update_props(props(3)));

	assert!(!first);
	assert!(second);
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
	assert_eq!(*fetcher.last_props.lock(), Some(props(3)));
}

#[rstest]
#[tokio::test]
async fn test_hot_update_refetches_named_islands(fetcher: Arc<MockFetcher>) {
	let app = client_app();
	let island = Arc::new(island(&app, &fetcher));
	island.watch_hot_updates();

	app.hooks().island_hot_update(&["Other".to_string()]).await.unwrap();
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

	app.hooks().island_hot_update(&["Card".to_string()]).await.unwrap();
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

	drop(island);
	app.hooks().island_hot_update(&["Card".to_string()]).await.unwrap();
	assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}
