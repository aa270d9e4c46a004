use livedom::{
	diff::{diff, diff_children, DomChange, DomChanges},
	error::{DiffError, PathError},
	mirror::VirtualDocument,
	node::{Attribute, Node, Style, Tag, Text, XmlNs},
	path::TreePositionPath,
};

fn path(s: &str) -> TreePositionPath {
	TreePositionPath::of(s).unwrap()
}

fn tag(name: &str, children: impl IntoIterator<Item = Node>) -> Tag {
	let mut tag = Tag::new(XmlNs::HTML, name, false);
	for child in children {
		tag.add_child(child);
	}
	tag
}

fn el(name: &str, children: impl IntoIterator<Item = Node>) -> Node {
	tag(name, children).into()
}

fn txt(text: &str) -> Node {
	Text::new(text).into()
}

fn changes_between(old: &[Node], new: &[Node]) -> DomChanges {
	let mut changes = DomChanges::new();
	diff_children(old, new, &path("1"), &mut changes).unwrap();
	changes
}

/// Applies the diff to a mirror of `old` and checks that it ends up equal to `new`.
fn assert_round_trip(old: Vec<Node>, new: Vec<Node>) {
	let changes = changes_between(&old, &new);
	let mut document = VirtualDocument::from_nodes(old);
	document.apply(changes.changes());
	assert_eq!(document, VirtualDocument::from_nodes(new), "{:#?}", changes.changes());
}

#[test]
fn text_change_and_appended_element() {
	let old = vec![el("div", [el("span", [txt("A")])])];
	let new = vec![el("div", [el("span", [txt("B")]), el("em", [txt("C")])])];

	assert_eq!(
		changes_between(&old, &new).changes(),
		&[
			DomChange::CreateText {
				parent: path("1_1"),
				path: path("1_1_1"),
				text: "B".to_owned(),
			},
			DomChange::Create {
				parent: path("1"),
				path: path("1_2"),
				ns: XmlNs::HTML,
				tag: "em".to_owned(),
			},
			DomChange::CreateText {
				parent: path("1_2"),
				path: path("1_2_1"),
				text: "C".to_owned(),
			},
		]
	);
	assert_round_trip(old, new);
}

#[test]
fn identical_trees_produce_nothing() {
	let mut rich = tag("a", [txt("x"), el("b", [txt("y")])]);
	rich.add_attribute(Attribute::new("href", "/", false));
	rich.add_style(Style::new("color", "red"));
	let nodes = vec![Node::from(rich), txt("tail")];

	assert!(changes_between(&nodes, &nodes).is_empty());
	assert!(changes_between(&[], &[]).is_empty());
}

#[test]
fn attribute_order_is_irrelevant() {
	let mut a = Tag::new(XmlNs::HTML, "a", false);
	a.add_attribute(Attribute::new("href", "/", false));
	a.add_attribute(Attribute::new("class", "c", false));
	let mut b = Tag::new(XmlNs::HTML, "a", false);
	b.add_attribute(Attribute::new("class", "c", false));
	b.add_attribute(Attribute::new("href", "/", false));

	let mut changes = DomChanges::new();
	diff(Some(&a), &b, &path("1"), &mut changes).unwrap();
	assert!(changes.is_empty());
}

#[test]
fn changed_attribute_is_removed_then_set() {
	let mut old = Tag::new(XmlNs::HTML, "a", false);
	old.add_attribute(Attribute::new("href", "/old", false));
	old.add_attribute(Attribute::new("class", "c", false));
	let mut new = Tag::new(XmlNs::HTML, "a", false);
	new.add_attribute(Attribute::new("href", "/new", false));
	new.add_attribute(Attribute::new("class", "c", false));

	let mut changes = DomChanges::new();
	diff(Some(&old), &new, &path("1"), &mut changes).unwrap();
	assert_eq!(
		changes.changes(),
		&[
			DomChange::RemoveAttr {
				path: path("1"),
				ns: XmlNs::HTML,
				name: "href".to_owned(),
				is_property: false,
			},
			DomChange::SetAttr {
				path: path("1"),
				ns: XmlNs::HTML,
				name: "href".to_owned(),
				value: "/new".to_owned(),
				is_property: false,
			},
		]
	);
	assert_round_trip(vec![old.into()], vec![new.into()]);
}

#[test]
fn styles_round_trip() {
	let mut old = Tag::new(XmlNs::HTML, "p", false);
	old.add_style(Style::new("color", "red"));
	old.add_style(Style::new("margin", "0"));
	let mut new = Tag::new(XmlNs::HTML, "p", false);
	new.add_style(Style::new("color", "blue"));

	let changes = changes_between(&[old.clone().into()], &[new.clone().into()]);
	assert!(changes.changes().contains(&DomChange::RemoveStyle {
		path: path("1"),
		name: "margin".to_owned(),
	}));
	assert!(changes.changes().contains(&DomChange::SetStyle {
		path: path("1"),
		name: "color".to_owned(),
		value: "blue".to_owned(),
	}));
	assert_round_trip(vec![old.into()], vec![new.into()]);
}

#[test]
fn renamed_tag_is_replaced() {
	let old = vec![el("div", [el("p", [txt("x")])])];
	let new = vec![el("div", [el("ul", [el("li", [txt("y")])])])];

	let changes = changes_between(&old, &new);
	assert_eq!(
		&changes.changes()[..2],
		&[
			DomChange::Remove {
				parent: path("1"),
				path: path("1_1"),
			},
			DomChange::Create {
				parent: path("1"),
				path: path("1_1"),
				ns: XmlNs::HTML,
				tag: "ul".to_owned(),
			},
		]
	);
	assert!(changes.is_removed(&path("1_1")));
	assert!(changes.is_removed(&path("1_1_1")));
	assert!(!changes.is_removed(&path("1")));
	assert_round_trip(old, new);
}

#[test]
fn namespace_change_is_a_replacement() {
	let old = vec![Tag::new(XmlNs::HTML, "a", false).into()];
	let new = vec![Tag::new(XmlNs::SVG, "a", false).into()];

	let changes = changes_between(&old, &new);
	assert_eq!(
		changes.changes(),
		&[
			DomChange::Remove {
				parent: TreePositionPath::empty(),
				path: path("1"),
			},
			DomChange::Create {
				parent: TreePositionPath::empty(),
				path: path("1"),
				ns: XmlNs::SVG,
				tag: "a".to_owned(),
			},
		]
	);
	assert_round_trip(old, new);
}

#[test]
fn surplus_nodes_are_removed() {
	let old = vec![el("ul", [el("li", [txt("1")]), el("li", [txt("2")]), el("li", [txt("3")])])];
	let new = vec![el("ul", [el("li", [txt("1")])])];

	assert_eq!(
		changes_between(&old, &new).changes(),
		&[
			DomChange::Remove {
				parent: path("1"),
				path: path("1_2"),
			},
			DomChange::Remove {
				parent: path("1"),
				path: path("1_3"),
			},
		]
	);
	assert_round_trip(old, new);
}

#[test]
fn kind_change_replaces_node() {
	let old = vec![el("p", [el("b", [txt("bold")]), txt("plain")])];
	let new = vec![el("p", [txt("plain"), el("i", [txt("italic")])])];

	let changes = changes_between(&old, &new);
	assert_eq!(
		changes.changes()[0],
		DomChange::Remove {
			parent: path("1"),
			path: path("1_1"),
		}
	);
	assert_round_trip(old, new);
}

#[test]
fn top_level_siblings_advance() {
	let old = vec![txt("a")];
	let new = vec![txt("a"), el("hr", []), txt("b")];

	assert_eq!(
		changes_between(&old, &new).changes(),
		&[
			DomChange::Create {
				parent: TreePositionPath::empty(),
				path: path("2"),
				ns: XmlNs::HTML,
				tag: "hr".to_owned(),
			},
			DomChange::CreateText {
				parent: TreePositionPath::empty(),
				path: path("3"),
				text: "b".to_owned(),
			},
		]
	);
	assert_round_trip(old, new);
}

#[test]
fn window_path_cannot_hold_nodes() {
	let mut changes = DomChanges::new();
	assert_eq!(
		diff_children(&[], &[txt("x")], &TreePositionPath::empty(), &mut changes),
		Err(DiffError::Path(PathError::NoParent))
	);
	assert_eq!(diff_children(&[], &[], &TreePositionPath::empty(), &mut changes), Ok(()));
}

#[test]
fn attributes_merge_exact_duplicates_only() {
	let mut input = Tag::new(XmlNs::HTML, "input", true);
	input.add_attribute(Attribute::new("value", "a", false));
	input.add_attribute(Attribute::new("value", "a", false));
	input.add_attribute(Attribute::new("value", "a", true));
	input.add_attribute(Attribute::new("value", "b", false));

	assert_eq!(
		input.attributes(),
		&[
			Attribute::new("value", "a", false),
			Attribute::new("value", "a", true),
			Attribute::new("value", "b", false),
		]
	);
}
