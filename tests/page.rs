use livedom::{
	command::RemoteCommand,
	component::{Component, ComponentCompositeKey, ComponentContext, InitialState, QualifiedSessionId, StateHandle, StateStore},
	config::PageConfig,
	context::Reply,
	definition::{component, fragment, on_component_event, tag, text, window_on, Definition},
	diff::DomChange,
	error::{PageError, RemoteError},
	event::EventEntry,
	node::XmlNs,
	page::{DomEventNotification, LivePage, PropertyResponse},
	path::TreePositionPath,
	reference::Ref,
	schedule::TimerRef,
};
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

fn path(s: &str) -> TreePositionPath {
	TreePositionPath::of(s).unwrap()
}

struct Harness {
	page: LivePage,
	sent: Arc<Mutex<Vec<RemoteCommand>>>,
}

impl Harness {
	fn new() -> Self {
		init_tracing();
		let sent = Arc::new(Mutex::new(Vec::new()));
		let out = {
			let sent = Arc::clone(&sent);
			move |command: RemoteCommand| sent.lock().unwrap().push(command)
		};
		Self {
			page: LivePage::new(QualifiedSessionId::new("device", "session"), PageConfig::new(), Arc::new(out)),
			sent,
		}
	}

	fn take(&self) -> Vec<RemoteCommand> {
		std::mem::take(&mut *self.sent.lock().unwrap())
	}

	async fn dispatch(&self, at: &str, event_type: &str) {
		self.page
			.dispatch_event(DomEventNotification {
				render_number: 0,
				path: path(at),
				event_type: event_type.to_owned(),
				payload: Value::Null,
			})
			.await;
	}
}

type Slot<S> = Arc<Mutex<Option<StateHandle<S>>>>;

/// Keeps the state handle of `component` once it is mounted.
fn capture<S: Send + Sync + 'static>(component: Component<S>) -> (Component<S>, Slot<S>) {
	let slot: Slot<S> = Arc::default();
	let component = {
		let slot = Arc::clone(&slot);
		component.on_mounted(move |_, _, handle| *slot.lock().unwrap() = Some(handle.clone()))
	};
	(component, slot)
}

fn handle<S: Send + 'static>(slot: &Slot<S>) -> StateHandle<S> {
	slot.lock().unwrap().clone().expect("component not mounted")
}

fn counter_view(count: &i32, handle: &StateHandle<i32>) -> Definition {
	let handle = handle.clone();
	tag("button")
		.on("click", move |_| handle.apply_state_transformation(|count| count + 1))
		.child(text(count))
		.into()
}

fn counter() -> Component<i32> {
	Component::with_initial_state("counter", 0, counter_view)
}

fn listen(event_type: &str, at: &str) -> EventEntry {
	EventEntry::new(event_type, path(at), Arc::new(|_: &mut livedom::context::EventContext<'_>| ()))
}

#[tokio::test]
async fn counter_click_sends_one_text_change() {
	let h = Harness::new();
	h.page.mount(counter()).await.unwrap();
	assert_eq!(h.page.html().await, "<button>0</button>");
	assert_eq!(h.take(), vec![RemoteCommand::ListenEvent(vec![listen("click", "1")])]);

	h.dispatch("1_1", "click").await;

	assert_eq!(
		h.take(),
		vec![RemoteCommand::ModifyDom(vec![DomChange::CreateText {
			parent: path("1"),
			path: path("1_1"),
			text: "1".to_owned(),
		}])]
	);
	assert_eq!(h.page.html().await, "<button>1</button>");
}

#[tokio::test]
async fn unchanged_render_sends_nothing() {
	let h = Harness::new();
	let (root, slot) = capture(counter());
	h.page.mount(root).await.unwrap();
	h.take();

	let handle = handle(&slot);
	handle.set_state(0);
	handle.apply_state_transformation_if_present(|_| None);
	h.page.flush().await;

	assert!(h.take().is_empty());
	assert_eq!(h.page.html().await, "<button>0</button>");
}

#[tokio::test]
async fn unhandled_events_are_ignored() {
	let h = Harness::new();
	h.page.mount(counter()).await.unwrap();
	h.take();

	h.dispatch("1", "input").await;
	h.dispatch("2", "click").await;

	assert!(h.take().is_empty());
	assert_eq!(h.page.html().await, "<button>0</button>");
}

#[tokio::test]
async fn event_subscriptions_are_reconciled() {
	let h = Harness::new();
	let (root, slot) = capture(Component::with_initial_state("toggle", false, |on: &bool, _: &StateHandle<bool>| {
		let b = if *on { tag("b").on("input", |_| ()) } else { tag("b").on("click", |_| ()) };
		tag("div").child(b).into()
	}));
	h.page.mount(root).await.unwrap();
	assert_eq!(h.take(), vec![RemoteCommand::ListenEvent(vec![listen("click", "1_1")])]);

	handle(&slot).set_state(true);
	h.page.flush().await;

	assert_eq!(
		h.take(),
		vec![
			RemoteCommand::ForgetEvent {
				event_type: "click".to_owned(),
				path: path("1_1"),
			},
			RemoteCommand::ListenEvent(vec![listen("input", "1_1")]),
		]
	);
	assert_eq!(h.page.recursive_events().await, vec![listen("input", "1_1")]);
}

#[tokio::test]
async fn recreated_targets_are_listened_to_again() {
	let h = Harness::new();
	let (root, slot) = capture(Component::with_initial_state("retag", "b", |name: &&'static str, _: &StateHandle<&'static str>| {
		tag("div").child(tag(*name).on("click", |_| ())).into()
	}));
	h.page.mount(root).await.unwrap();
	h.take();

	handle(&slot).set_state("i");
	h.page.flush().await;

	assert_eq!(
		h.take(),
		vec![
			RemoteCommand::ModifyDom(vec![
				DomChange::Remove {
					parent: path("1"),
					path: path("1_1"),
				},
				DomChange::Create {
					parent: path("1"),
					path: path("1_1"),
					ns: XmlNs::HTML,
					tag: "i".to_owned(),
				},
			]),
			RemoteCommand::ListenEvent(vec![listen("click", "1_1")]),
		]
	);
	assert_eq!(h.page.html().await, "<div><i></i></div>");
}

fn logged<S: Send + Sync + 'static>(component: Component<S>, name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Component<S> {
	let (mounted, unmounted) = (Arc::clone(log), Arc::clone(log));
	component
		.on_mounted(move |_, _, _| mounted.lock().unwrap().push(format!("mounted {}", name)))
		.on_unmounted(move |_, _| unmounted.lock().unwrap().push(format!("unmounted {}", name)))
}

#[tokio::test]
async fn children_unmount_descendants_first() {
	let h = Harness::new();
	let log = Arc::new(Mutex::new(Vec::<String>::new()));

	let grandchild = logged(Component::with_initial_state("grandchild", (), |_: &(), _: &StateHandle<()>| text("g")), "grandchild", &log);
	let child = logged(
		Component::with_initial_state("child", (), move |_: &(), _: &StateHandle<()>| tag("div").child(component(grandchild.clone())).into()),
		"child",
		&log,
	);
	let (root, slot) = capture(Component::with_initial_state("parent", true, move |show: &bool, _: &StateHandle<bool>| {
		let section = tag("section");
		let section = if *show { section.child(component(child.clone())) } else { section };
		section.into()
	}));

	h.page.mount(root).await.unwrap();
	assert_eq!(*log.lock().unwrap(), vec!["mounted grandchild", "mounted child"]);
	assert_eq!(h.page.html().await, "<section><div>g</div></section>");
	assert_eq!(h.page.component_html(&path("1_1")).await, Ok("<div>g</div>".to_owned()));
	assert_eq!(h.page.component_html(&path("1_1_1")).await, Ok("g".to_owned()));
	assert_eq!(h.page.component_html(&path("1_2")).await, Err(PageError::NotFound { path: path("1_2") }));

	// Re-rendering with the same children neither mounts nor unmounts them.
	handle(&slot).set_state(true);
	h.page.flush().await;
	assert_eq!(log.lock().unwrap().len(), 2);
	assert!(h.take().is_empty());

	handle(&slot).set_state(false);
	h.page.flush().await;
	assert_eq!(
		*log.lock().unwrap(),
		vec!["mounted grandchild", "mounted child", "unmounted grandchild", "unmounted child"]
	);
	assert_eq!(
		h.take(),
		vec![RemoteCommand::ModifyDom(vec![DomChange::Remove {
			parent: path("1"),
			path: path("1_1"),
		}])]
	);
	assert_eq!(h.page.html().await, "<section></section>");
}

#[tokio::test(start_paused = true)]
async fn events_before_mount_are_replayed() {
	let h = Harness::new();
	let root = Component::new(
		"slow",
		|_: &ComponentCompositeKey, _: &ComponentContext| {
			InitialState::pending(async {
				sleep(Duration::from_millis(50)).await;
				10
			})
		},
		counter_view,
	);

	let (mounted, ()) = tokio::join!(h.page.mount(root), h.dispatch("1", "click"));
	mounted.unwrap();

	assert_eq!(
		h.take(),
		vec![
			RemoteCommand::ListenEvent(vec![listen("click", "1")]),
			RemoteCommand::ModifyDom(vec![DomChange::CreateText {
				parent: path("1"),
				path: path("1_1"),
				text: "11".to_owned(),
			}]),
		]
	);
}

fn label() -> (Component<String>, Slot<String>) {
	capture(Component::with_initial_state("label", "initial".to_owned(), |label: &String, _: &StateHandle<String>| {
		tag("p").child(text(label)).into()
	}))
}

#[tokio::test(start_paused = true)]
async fn async_state_is_applied_when_complete() {
	let h = Harness::new();
	let (root, slot) = label();
	h.page.mount(root).await.unwrap();

	handle(&slot).apply_when_complete(async {
		sleep(Duration::from_millis(100)).await;
		"done".to_owned()
	});
	h.page.flush().await;
	assert_eq!(h.page.html().await, "<p>initial</p>");

	sleep(Duration::from_millis(200)).await;
	h.page.flush().await;
	assert_eq!(h.page.html().await, "<p>done</p>");
}

#[tokio::test(start_paused = true)]
async fn stale_async_state_is_discarded() {
	let h = Harness::new();
	let (root, slot) = label();
	h.page.mount(root).await.unwrap();

	let handle = handle(&slot);
	handle.apply_when_complete(async {
		sleep(Duration::from_millis(100)).await;
		"slow".to_owned()
	});
	handle.set_state("fast".to_owned());
	h.page.flush().await;
	assert_eq!(h.page.html().await, "<p>fast</p>");

	sleep(Duration::from_millis(200)).await;
	h.page.flush().await;
	assert_eq!(h.page.html().await, "<p>fast</p>");
}

#[tokio::test(start_paused = true)]
async fn timers_can_be_cancelled() {
	let h = Harness::new();
	let (root, slot) = capture(counter());
	h.page.mount(root).await.unwrap();
	let handle = handle(&slot);

	let timer = TimerRef::named("bump");
	let bump = {
		let handle = handle.clone();
		move || handle.apply_state_transformation(|count| count + 1)
	};
	h.page.schedule(timer.clone(), Duration::from_millis(50), bump.clone());
	assert!(h.page.is_scheduled(&timer));
	h.page.cancel(&timer);
	h.page.cancel(&TimerRef::named("never scheduled"));

	sleep(Duration::from_millis(100)).await;
	assert!(!h.page.is_scheduled(&timer));
	assert_eq!(h.page.html().await, "<button>0</button>");

	h.page.schedule(timer.clone(), Duration::from_millis(50), bump);
	sleep(Duration::from_millis(100)).await;
	assert!(!h.page.is_scheduled(&timer));
	assert_eq!(h.page.html().await, "<button>1</button>");
}

#[tokio::test(start_paused = true)]
async fn fixed_rate_timers_repeat_until_cancelled() {
	let h = Harness::new();
	let ticks = Arc::new(AtomicUsize::new(0));
	let timer = TimerRef::unique();
	{
		let ticks = Arc::clone(&ticks);
		h.page.schedule_at_fixed_rate(timer.clone(), Duration::from_millis(10), Duration::from_millis(10), move || {
			ticks.fetch_add(1, Ordering::SeqCst);
		});
	}

	sleep(Duration::from_millis(35)).await;
	assert_eq!(ticks.load(Ordering::SeqCst), 3);

	h.page.cancel(&timer);
	sleep(Duration::from_millis(50)).await;
	assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn property_requests_resolve_through_replies() {
	let h = Harness::new();
	let replies = Arc::new(Mutex::new(Vec::<Reply>::new()));
	let input = Ref::new();
	let root = {
		let replies = Arc::clone(&replies);
		Component::with_initial_state("form", (), move |_: &(), _: &StateHandle<()>| {
			let replies = Arc::clone(&replies);
			tag("input")
				.with_ref(input)
				.on("change", move |ctx| {
					let mut replies = replies.lock().unwrap();
					replies.push(ctx.properties_by_ref(&input).get("value"));
					replies.push(ctx.properties_by_ref(&Ref::new()).get("value"));
					replies.push(ctx.eval_js("document.title"));
				})
				.into()
		})
	};
	h.page.mount(root).await.unwrap();
	h.take();

	h.dispatch("1", "change").await;
	let sent = h.take();
	let (property, script) = match sent.as_slice() {
		[RemoteCommand::ExtractProperty { descriptor: property, path: at, name }, RemoteCommand::EvalJs { descriptor: script, code }] => {
			assert_eq!((at, name.as_str(), code.as_str()), (&path("1"), "value", "document.title"));
			(*property, *script)
		}
		other => panic!("unexpected commands {:?}", other),
	};
	assert_ne!(property, script);

	h.page.handle_extract_property_response(property, PropertyResponse::Value(json!("typed")));
	h.page.handle_eval_js_response(script, Err("boom".to_owned()));
	h.page.handle_eval_js_response(script, Ok(Value::Null));

	let mut replies = std::mem::take(&mut *replies.lock().unwrap()).into_iter();
	assert_eq!(replies.next().unwrap().await, Ok(json!("typed")));
	assert_eq!(replies.next().unwrap().await, Err(RemoteError::UnresolvedRef));
	assert_eq!(
		replies.next().unwrap().await,
		Err(RemoteError::EvalFailed {
			descriptor: script,
			message: "boom".to_owned(),
		})
	);
}

#[tokio::test]
async fn missing_properties_are_reported() {
	let h = Harness::new();
	let replies = Arc::new(Mutex::new(Vec::<Reply>::new()));
	let root = {
		let replies = Arc::clone(&replies);
		Component::with_initial_state("scroll", (), move |_: &(), _: &StateHandle<()>| {
			let replies = Arc::clone(&replies);
			window_on("scroll", move |ctx| replies.lock().unwrap().push(ctx.properties_by_ref(&Ref::WINDOW).get("scrollY")))
		})
	};
	h.page.mount(root).await.unwrap();
	assert_eq!(h.take(), vec![RemoteCommand::ListenEvent(vec![listen("scroll", "")])]);

	h.dispatch("", "scroll").await;
	let descriptor = match h.take().as_slice() {
		[RemoteCommand::ExtractProperty { descriptor, path: at, .. }] if at.is_empty() => *descriptor,
		other => panic!("unexpected commands {:?}", other),
	};
	h.page.handle_extract_property_response(descriptor, PropertyResponse::NotFound);

	let reply = replies.lock().unwrap().pop().unwrap();
	assert_eq!(reply.await, Err(RemoteError::PropertyNotFound { descriptor }));
}

#[tokio::test]
async fn component_events_reach_subscribers() {
	let h = Harness::new();
	let root = Component::with_initial_state("total", 0_i64, |total: &i64, handle: &StateHandle<i64>| {
		let handle = handle.clone();
		fragment([
			tag("button").on("click", |ctx| ctx.emit("add", json!(2))).into(),
			on_component_event("add", move |ctx| {
				let by = ctx.event_object().as_i64().unwrap_or(1);
				handle.apply_state_transformation(move |total| total + by);
			}),
			text(total),
		])
	});
	h.page.mount(root).await.unwrap();
	assert_eq!(h.page.html().await, "<button></button>0");

	h.dispatch("1", "click").await;
	assert_eq!(h.page.html().await, "<button></button>2");
	h.page.notify_component_event("add", json!(3)).await;
	assert_eq!(h.page.html().await, "<button></button>5");
	h.page.notify_component_event("unknown", Value::Null).await;
	assert_eq!(h.page.html().await, "<button></button>5");
}

#[tokio::test]
async fn window_events_catch_bubbling_events() {
	let h = Harness::new();
	let root = Component::with_initial_state("keys", 0, |count: &i32, handle: &StateHandle<i32>| {
		let handle = handle.clone();
		fragment([window_on("keydown", move |_| handle.apply_state_transformation(|count| count + 1)), tag("p").child(text(count)).into()])
	});
	h.page.mount(root).await.unwrap();

	h.dispatch("1_1", "keydown").await;
	assert_eq!(h.page.html().await, "<p>1</p>");
}

#[tokio::test]
async fn navigation_commands() {
	let h = Harness::new();
	let root = Component::with_initial_state("nav", (), |_: &(), _: &StateHandle<()>| {
		tag("a")
			.on("click", |ctx| {
				ctx.push_history("/next");
				ctx.set_href("https://example.com/");
			})
			.into()
	});
	h.page.mount(root).await.unwrap();
	h.take();

	h.dispatch("1", "click").await;
	assert_eq!(
		h.take(),
		vec![
			RemoteCommand::PushHistory("/next".to_owned()),
			RemoteCommand::SetHref("https://example.com/".to_owned()),
		]
	);
}

#[tokio::test]
async fn failed_renders_keep_the_previous_content() {
	let h = Harness::new();
	let (root, slot) = capture(Component::with_initial_state("fragile", 0, |n: &i32, _: &StateHandle<i32>| {
		assert!(*n != 13, "unlucky number");
		text(n)
	}));
	h.page.mount(root).await.unwrap();
	h.take();
	let handle = handle(&slot);

	handle.set_state(13);
	h.page.flush().await;
	assert!(h.take().is_empty());
	assert_eq!(h.page.html().await, "0");

	handle.set_state(1);
	h.page.flush().await;
	assert_eq!(h.page.html().await, "1");
}

#[tokio::test]
async fn adjacent_text_merges_within_a_component_only() {
	let h = Harness::new();
	let inner = Component::with_initial_state("inner", (), |_: &(), _: &StateHandle<()>| text("c"));
	let root = Component::with_initial_state("outer", (), move |_: &(), _: &StateHandle<()>| {
		fragment([text("a"), text("b"), component(inner.clone())])
	});
	h.page.mount(root).await.unwrap();

	assert_eq!(h.page.html().await, "abc");
	assert_eq!(h.page.document().await.nodes().len(), 2);
}

#[tokio::test]
async fn stored_state_survives_remounts() {
	let store = StateStore::<i32>::new();

	let first = Harness::new();
	let (root, slot) = capture(Component::with_stored_state("stored", 0, store.clone(), counter_view));
	first.page.mount(root).await.unwrap();
	let handle = handle(&slot);
	handle.set_state(5);
	first.page.flush().await;
	assert_eq!(store.get(handle.key()), Some(5));
	first.page.shutdown().await;

	let second = Harness::new();
	second.page.mount(Component::with_stored_state("stored", 0, store, counter_view)).await.unwrap();
	assert_eq!(second.page.html().await, "<button>5</button>");
}

#[tokio::test]
async fn html_starts_with_the_document_type() {
	init_tracing();
	let config = PageConfig::new().with_doc_type("<!DOCTYPE html>");
	let page = LivePage::new(QualifiedSessionId::new("device", "doctype"), config, Arc::new(|_: RemoteCommand| ()));
	page.mount(Component::with_initial_state("static", (), |_, _| tag("p").child("x").into())).await.unwrap();
	assert_eq!(page.html().await, "<!DOCTYPE html><p>x</p>");
}

#[tokio::test]
async fn mounting_twice_fails() {
	let h = Harness::new();
	h.page.mount(counter()).await.unwrap();
	assert_eq!(h.page.mount(counter()).await, Err(PageError::AlreadyMounted));
}

#[tokio::test]
async fn shutdown_closes_the_session() {
	let h = Harness::new();
	let log = Arc::new(Mutex::new(Vec::<String>::new()));
	let replies = Arc::new(Mutex::new(Vec::<Reply>::new()));
	let root = {
		let replies = Arc::clone(&replies);
		logged(
			Component::with_initial_state("closing", (), move |_: &(), _: &StateHandle<()>| {
				let replies = Arc::clone(&replies);
				tag("div").on("click", move |ctx| replies.lock().unwrap().push(ctx.eval_js("1"))).into()
			}),
			"closing",
			&log,
		)
	};
	h.page.mount(root).await.unwrap();
	h.dispatch("1", "click").await;
	h.take();

	h.page.shutdown().await;
	assert_eq!(*log.lock().unwrap(), vec!["mounted closing", "unmounted closing"]);

	let reply = replies.lock().unwrap().pop().unwrap();
	assert_eq!(reply.await, Err(RemoteError::SessionClosed));

	h.dispatch("1", "click").await;
	assert!(h.take().is_empty());
	assert!(replies.lock().unwrap().is_empty());
	assert_eq!(h.page.mount(counter()).await, Err(PageError::ShutDown));
}

#[tokio::test]
async fn removed_targets_are_not_forgotten() {
	let h = Harness::new();
	let (root, slot) = capture(Component::with_initial_state("list", true, |show: &bool, _: &StateHandle<bool>| {
		let div = tag("div").child(tag("span"));
		let div = if *show { div.child(tag("b").on("click", |_| ())) } else { div };
		div.into()
	}));
	h.page.mount(root).await.unwrap();
	assert_eq!(h.take(), vec![RemoteCommand::ListenEvent(vec![listen("click", "1_2")])]);

	handle(&slot).set_state(false);
	h.page.flush().await;

	assert_eq!(
		h.take(),
		vec![RemoteCommand::ModifyDom(vec![DomChange::Remove {
			parent: path("1"),
			path: path("1_2"),
		}])]
	);
	assert!(h.page.recursive_events().await.is_empty());
}

#[tokio::test]
async fn children_unmount_before_the_parent_is_updated() {
	let h = Harness::new();
	let log = Arc::new(Mutex::new(Vec::<String>::new()));

	let child = logged(Component::with_initial_state("child", (), |_: &(), _: &StateHandle<()>| text("c")), "child", &log);
	let updated = Arc::clone(&log);
	let (root, slot) = capture(
		Component::with_initial_state("parent", true, move |show: &bool, _: &StateHandle<bool>| {
			let div = tag("div");
			let div = if *show { div.child(component(child.clone())) } else { div };
			div.into()
		})
		.on_updated(move |_, old: &bool, new: &bool, _| updated.lock().unwrap().push(format!("updated parent {} -> {}", old, new))),
	);

	h.page.mount(root).await.unwrap();
	assert_eq!(*log.lock().unwrap(), vec!["mounted child"]);

	handle(&slot).set_state(false);
	h.page.flush().await;

	assert_eq!(
		*log.lock().unwrap(),
		vec!["mounted child", "unmounted child", "updated parent true -> false"]
	);
}

#[test]
fn context_values_are_overlaid() {
	let base = ComponentContext::new().with("theme", "light".to_owned());
	let overlay = base.with("theme", "dark".to_owned()).with("size", 3_u8);

	assert_eq!(base.get::<String>("theme").map(String::as_str), Some("light"));
	assert_eq!(overlay.get::<String>("theme").map(String::as_str), Some("dark"));
	assert_eq!(overlay.get::<u8>("size"), Some(&3));
	assert_eq!(overlay.get::<String>("size"), None);
	assert!(!base.contains_key("size"));
}

fn theme_reader() -> Component<String> {
	Component::new(
		"reader",
		|_: &ComponentCompositeKey, context: &ComponentContext| InitialState::Ready(context.get::<String>("theme").cloned().unwrap_or_default()),
		|theme: &String, _: &StateHandle<String>| tag("i").child(text(theme)).into(),
	)
}

#[tokio::test]
async fn context_reaches_descendants_and_can_be_overridden() {
	let h = Harness::new();
	let dark = Component::with_initial_state("dark", (), |_: &(), _: &StateHandle<()>| component(theme_reader()))
		.with_context(|context: &ComponentContext, _: &()| context.with("theme", "dark".to_owned()));
	let root = Component::with_initial_state("root", (), move |_: &(), _: &StateHandle<()>| {
		fragment([component(theme_reader()), component(dark.clone())])
	})
	.with_context(|context: &ComponentContext, _: &()| context.with("theme", "light".to_owned()));

	h.page.mount(root).await.unwrap();

	assert_eq!(h.page.html().await, "<i>light</i><i>dark</i>");
}

#[tokio::test]
async fn failing_root_state_resolution_mounts_nothing() {
	let h = Harness::new();
	let root = Component::new(
		"broken",
		|_: &ComponentCompositeKey, _: &ComponentContext| -> InitialState<i32> { panic!("no state") },
		counter_view,
	);

	h.page.mount(root).await.unwrap();
	assert_eq!(h.page.html().await, "");
	assert!(h.take().is_empty());
	assert_eq!(h.page.mount(counter()).await, Err(PageError::AlreadyMounted));

	h.dispatch("1", "click").await;
	assert!(h.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_child_state_resolution_is_contained() {
	let h = Harness::new();
	let broken = Component::new(
		"broken",
		|_: &ComponentCompositeKey, _: &ComponentContext| -> InitialState<()> {
			InitialState::pending(async { panic!("no state") })
		},
		|_: &(), _: &StateHandle<()>| text("never"),
	);
	let (root, slot) = capture(Component::with_initial_state("parent", 0, move |n: &i32, _: &StateHandle<i32>| {
		let p = tag("p").child(text(n));
		if *n == 1 {
			fragment([p.into(), component(broken.clone())])
		} else {
			p.into()
		}
	}));
	h.page.mount(root).await.unwrap();
	let handle = handle(&slot);

	handle.set_state(1);
	sleep(Duration::from_millis(10)).await;
	assert_eq!(h.page.html().await, "<p>1</p>");

	handle.set_state(2);
	sleep(Duration::from_millis(10)).await;
	assert_eq!(h.page.html().await, "<p>2</p>");
}

#[tokio::test(start_paused = true)]
async fn panicking_callbacks_leave_updates_flowing() {
	let h = Harness::new();
	let (root, slot) = capture(counter().on_updated(|_, _, new: &i32, _| assert_ne!(*new, 1, "refusing 1")));
	h.page.mount(root).await.unwrap();
	let handle = handle(&slot);

	handle.set_state(1);
	sleep(Duration::from_millis(10)).await;
	assert_eq!(h.page.html().await, "<button>1</button>");

	handle.set_state(2);
	sleep(Duration::from_millis(10)).await;
	assert_eq!(h.page.html().await, "<button>2</button>");
}

#[tokio::test]
async fn render_number_is_announced_when_configured() {
	init_tracing();
	let sent = Arc::new(Mutex::new(Vec::new()));
	let out = {
		let sent = Arc::clone(&sent);
		move |command: RemoteCommand| sent.lock().unwrap().push(command)
	};
	let config = PageConfig::new().with_render_number_announcement(true);
	let page = LivePage::new(QualifiedSessionId::new("device", "announce"), config, Arc::new(out));

	page.mount(counter()).await.unwrap();

	assert_eq!(
		*sent.lock().unwrap(),
		vec![RemoteCommand::SetRenderNum(0), RemoteCommand::ListenEvent(vec![listen("click", "1")])]
	);
}
