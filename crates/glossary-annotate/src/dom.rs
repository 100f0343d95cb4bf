//! Tolerant parsing, text-node selection and serialization over an `RcDom`.

use std::collections::BTreeSet;
use std::io;
use std::rc::Rc;

use html5ever::serialize::{SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document, serialize};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

/// Elements whose text is raw and can never hold markup.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

/// A parsed fragment. The parser always wraps content in a synthetic
/// document; `body` is where the fragment's own nodes live.
pub(crate) struct Fragment {
    // Owns the tree `body` points into.
    _dom: RcDom,
    body: Handle,
}

impl Fragment {
    /// Malformed markup is recovered the way browsers do.
    pub(crate) fn parse(html: &str) -> Option<Self> {
        // An explicit body start tag keeps leading whitespace and head-only
        // elements inside the body.
        let mut source = String::with_capacity(html.len() + 6);
        source.push_str("<body>");
        source.push_str(html);

        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(source);
        let body = find_element(&dom.document, "body")?;
        Some(Self { _dom: dom, body })
    }

    pub(crate) fn body(&self) -> &Handle {
        &self.body
    }

    /// Move the body's children out, detached from this fragment.
    pub(crate) fn into_children(self) -> Vec<Handle> {
        // Taken before the tree drops: dropping an rcdom node empties the
        // children of every descendant it still holds.
        let children = self.body.children.take();
        for child in &children {
            child.parent.set(None);
        }
        children
    }

    /// Serialize the body's children, dropping the synthetic wrapper.
    pub(crate) fn to_html(&self) -> io::Result<String> {
        let mut out = Vec::new();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        };
        serialize(&mut out, &SerializableHandle::from(self.body.clone()), opts)?;
        String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Which subtrees are off limits for annotation.
pub(crate) struct Exclusions<'a> {
    pub(crate) class: &'a str,
    pub(crate) elements: &'a BTreeSet<String>,
}

impl Exclusions<'_> {
    fn excludes(&self, node: &Handle) -> bool {
        let NodeData::Element { name, attrs, .. } = &node.data else {
            return false;
        };
        let local: &str = &name.local;
        if matches!(local, "a" | "script")
            || RAW_TEXT_ELEMENTS.contains(&local)
            || self.elements.contains(local)
        {
            return true;
        }
        attrs.borrow().iter().any(|attr| {
            &*attr.name.local == "class"
                && attr.value.split_ascii_whitespace().any(|c| c == self.class)
        })
    }

    /// Text nodes under `root` (inclusive) in document order, skipping excluded subtrees.
    pub(crate) fn eligible_text_nodes(&self, root: &Handle) -> Vec<Handle> {
        let mut out = Vec::new();
        if !self.excludes(root) {
            self.collect(root, &mut out);
        }
        out
    }

    fn collect(&self, node: &Handle, out: &mut Vec<Handle>) {
        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Text { .. } => out.push(child.clone()),
                NodeData::Element { .. } if !self.excludes(child) => self.collect(child, out),
                _ => {}
            }
        }
    }
}

pub(crate) fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// Swap `node` for `replacements` in its parent's child list.
pub(crate) fn replace_node(node: &Handle, replacements: Vec<Handle>) -> bool {
    let Some(parent) = node.parent.take().and_then(|weak| weak.upgrade()) else {
        return false;
    };
    let mut children = parent.children.borrow_mut();
    let Some(pos) = children.iter().position(|c| Rc::ptr_eq(c, node)) else {
        return false;
    };
    for replacement in &replacements {
        replacement.parent.set(Some(Rc::downgrade(&parent)));
    }
    children.splice(pos..=pos, replacements);
    true
}

fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    for child in node.children.borrow().iter() {
        if let NodeData::Element { name, .. } = &child.data
            && &*name.local == tag
        {
            return Some(child.clone());
        }
        if let Some(found) = find_element(child, tag) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(html: &str, disabled: &[&str]) -> Vec<String> {
        let fragment = Fragment::parse(html).expect("body");
        let elements: BTreeSet<String> = disabled.iter().map(|s| s.to_string()).collect();
        let exclusions = Exclusions {
            class: "noglossary",
            elements: &elements,
        };
        exclusions
            .eligible_text_nodes(fragment.body())
            .iter()
            .filter_map(text_of)
            .collect()
    }

    #[test]
    fn skips_links_scripts_and_marked_subtrees() {
        let found = texts(
            r#"<p>keep <a href="/x">link <b>deep</b></a></p><script>var s;</script><div class="box noglossary"><p>hidden</p></div><style>p{}</style>tail"#,
            &[],
        );
        assert_eq!(found, vec!["keep ", "tail"]);
    }

    #[test]
    fn honours_configured_elements() {
        let found = texts("<h1>Title</h1><code>x</code><p>para</p>", &["code", "h1"]);
        assert_eq!(found, vec!["para"]);
    }

    #[test]
    fn round_trips_fragment_without_wrapper() {
        let fragment = Fragment::parse("  <p class=\"a\">x &amp; y</p><!-- c -->").expect("body");
        assert_eq!(
            fragment.to_html().unwrap(),
            "  <p class=\"a\">x &amp; y</p><!-- c -->"
        );
    }

    #[test]
    fn replaces_text_with_parsed_nodes() {
        let fragment = Fragment::parse("<p>before</p>").expect("body");
        let elements = BTreeSet::new();
        let exclusions = Exclusions {
            class: "noglossary",
            elements: &elements,
        };
        let node = exclusions.eligible_text_nodes(fragment.body())[0].clone();
        let snippet = Fragment::parse("a <em>b</em> c").expect("body");
        assert!(replace_node(&node, snippet.into_children()));
        assert_eq!(fragment.to_html().unwrap(), "<p>a <em>b</em> c</p>");
    }
}
