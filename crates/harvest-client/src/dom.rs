//! Small DOM capability the contact extractor is written against.
//!
//! `EvalDom` implements it on an attached page with short `Runtime.evaluate`
//! snippets; tests script a fake.

use async_trait::async_trait;
use harvest_interfaces::{ApiError, Page};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Path from the document to an element: each step picks the `index`-th
/// match of a selector below the previous element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Scope(Vec<(String, usize)>);

impl Scope {
    pub fn document() -> Self {
        Scope(Vec::new())
    }

    pub fn child(&self, selector: &str, index: usize) -> Scope {
        let mut path = self.0.clone();
        path.push((selector.to_string(), index));
        Scope(path)
    }

    pub fn steps(&self) -> &[(String, usize)] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

/// What the extractor may know about an element.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomNode {
    /// `textContent` with whitespace runs collapsed, trimmed.
    pub text: String,
    /// Raw `href` attribute, trimmed.
    pub href: String,
    /// Rendered, not transparent, and larger than 10x10.
    pub visible: bool,
    pub rect: Rect,
    pub z_index: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    /// The `index`-th match of `selector` under `scope`, widened to its
    /// `closest` ancestor when given. Clicked at its centre unless `at`.
    Node {
        scope: Scope,
        selector: String,
        index: usize,
        closest: Option<String>,
        at: Option<(f64, f64)>,
    },
    /// Whatever is rendered at a viewport point.
    Point { x: f64, y: f64 },
}

impl ClickTarget {
    pub fn node(scope: &Scope, selector: &str, index: usize) -> Self {
        ClickTarget::Node {
            scope: scope.clone(),
            selector: selector.to_string(),
            index,
            closest: None,
            at: None,
        }
    }

    pub fn closest(scope: &Scope, selector: &str, closest: &str) -> Self {
        ClickTarget::Node {
            scope: scope.clone(),
            selector: selector.to_string(),
            index: 0,
            closest: Some(closest.to_string()),
            at: None,
        }
    }
}

#[async_trait]
pub trait PageDom: Send + Sync {
    /// All matches of `selector` under `scope`, in document order. Empty when
    /// the scope no longer resolves.
    async fn nodes(&self, scope: &Scope, selector: &str) -> Result<Vec<DomNode>, ApiError>;

    /// Dispatches a synthetic pointer and click sequence. `false` when there
    /// was nothing to click.
    async fn click(&self, target: &ClickTarget) -> Result<bool, ApiError>;

    async fn press_escape(&self) -> Result<(), ApiError>;

    /// Hides the element at `root` and removes any modal backdrop.
    async fn force_hide(&self, root: &Scope) -> Result<(), ApiError>;

    async fn viewport(&self) -> Result<Viewport, ApiError>;

    async fn first(&self, scope: &Scope, selector: &str) -> Result<Option<DomNode>, ApiError> {
        Ok(self.nodes(scope, selector).await?.into_iter().next())
    }
}

const PRELUDE: &str = r#"
const h = {
  text: (el) => ((el && el.textContent) || '').replace(/\s+/g, ' ').trim(),
  visible: (el) => {
    if (!el || !el.getBoundingClientRect) return false;
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden' || Number(s.opacity || '1') === 0) return false;
    const r = el.getBoundingClientRect();
    return r.width > 10 && r.height > 10;
  },
  resolve: (path) => {
    let el = document;
    for (const [sel, i] of path) {
      if (!el) return null;
      el = el.querySelectorAll(sel)[i] || null;
    }
    return el;
  },
  describe: (el) => {
    const r = el.getBoundingClientRect();
    return {
      text: h.text(el),
      href: ((el.getAttribute && el.getAttribute('href')) || '').trim(),
      visible: h.visible(el),
      rect: { left: r.left, top: r.top, right: r.right, bottom: r.bottom, width: r.width, height: r.height },
      zIndex: Number(getComputedStyle(el).zIndex) || 0,
    };
  },
  fire: (el, x, y) => {
    try {
      for (const type of ['pointerdown', 'mousedown', 'pointerup', 'mouseup', 'click']) {
        el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window, clientX: x, clientY: y }));
      }
      return true;
    } catch (_) {
      try { el.click(); return true; } catch (_) { return false; }
    }
  },
};
"#;

fn js<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// `PageDom` over an attached page.
pub struct EvalDom<'a> {
    page: &'a dyn Page,
}

impl<'a> EvalDom<'a> {
    pub fn new(page: &'a dyn Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, body: &str) -> Result<T, ApiError> {
        let script = format!("(() => {{ {} {} }})()", PRELUDE, body);
        let value = self.page.evaluate_script(&script).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::ProtocolError(format!("unexpected script result: {}", e)))
    }
}

#[async_trait]
impl PageDom for EvalDom<'_> {
    async fn nodes(&self, scope: &Scope, selector: &str) -> Result<Vec<DomNode>, ApiError> {
        let body = format!(
            "const root = h.resolve({}); if (!root) return []; \
             return Array.from(root.querySelectorAll({})).map(h.describe);",
            js(scope),
            js(selector)
        );
        self.eval(&body).await
    }

    async fn click(&self, target: &ClickTarget) -> Result<bool, ApiError> {
        let body = match target {
            ClickTarget::Node {
                scope,
                selector,
                index,
                closest,
                at,
            } => format!(
                "const root = h.resolve({scope}); if (!root) return false; \
                 let el = root.querySelectorAll({selector})[{index}]; if (!el) return false; \
                 const widen = {closest}; if (widen) {{ el = el.closest(widen); if (!el) return false; }} \
                 let at = {at}; if (!at) {{ const r = el.getBoundingClientRect(); at = [r.left + r.width / 2, r.top + r.height / 2]; }} \
                 return h.fire(el, at[0], at[1]);",
                scope = js(scope),
                selector = js(selector),
                index = index,
                closest = js(closest),
                at = js(at),
            ),
            ClickTarget::Point { x, y } => format!(
                "const hit = document.elementFromPoint({x}, {y}); if (!hit) return false; \
                 const el = hit.closest('button,a,i,div,span,[role=\"button\"]') || hit; \
                 return h.fire(el, {x}, {y});",
                x = x,
                y = y,
            ),
        };
        self.eval(&body).await
    }

    async fn press_escape(&self) -> Result<(), ApiError> {
        let body = "document.dispatchEvent(new KeyboardEvent('keydown', \
                    { key: 'Escape', code: 'Escape', keyCode: 27, which: 27, bubbles: true })); \
                    return true;";
        self.eval::<bool>(body).await.map(|_| ())
    }

    async fn force_hide(&self, root: &Scope) -> Result<(), ApiError> {
        let body = format!(
            "const root = h.resolve({}); \
             if (root && root.style) {{ root.style.display = 'none'; root.style.visibility = 'hidden'; root.style.pointerEvents = 'none'; }} \
             document.body.style.overflow = ''; \
             const bd = document.querySelector('.modal-backdrop.show') || document.querySelector('.modal-backdrop'); \
             if (bd) bd.remove(); \
             return true;",
            js(root)
        );
        self.eval::<bool>(&body).await.map(|_| ())
    }

    async fn viewport(&self) -> Result<Viewport, ApiError> {
        self.eval("return { width: window.innerWidth, height: window.innerHeight };")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_serialises_as_path() {
        let scope = Scope::document().child("div.modal", 2).child(".modal-dialog", 0);
        assert_eq!(
            serde_json::to_value(&scope).unwrap(),
            json!([["div.modal", 2], [".modal-dialog", 0]])
        );
        assert_eq!(serde_json::to_value(Scope::document()).unwrap(), json!([]));
    }

    #[test]
    fn node_reads_script_shape() {
        let node: DomNode = serde_json::from_value(json!({
            "text": "Alice",
            "href": "mailto:a@x.com",
            "visible": true,
            "rect": {"left": 1.0, "top": 2.0, "right": 101.0, "bottom": 52.0, "width": 100.0, "height": 50.0},
            "zIndex": 1050
        }))
        .unwrap();
        assert_eq!(node.z_index, 1050);
        assert_eq!(node.rect.right, 101.0);
        assert!(node.visible);
    }

    #[test]
    fn selectors_are_embedded_as_string_literals() {
        assert_eq!(js(r#"a[href^="tel:"]"#), r#""a[href^=\"tel:\"]""#);
        assert_eq!(js(&None::<String>), "null");
        assert_eq!(js(&Some((3.0, 4.5))), "[3.0,4.5]");
    }
}
