//! Visual styles: scripted geometry plus measured content

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{ChangeMask, FromScript, Owner, ScriptErrorReport, Scriptable};
use crate::context::Context;
use crate::dependency::{Dependency, DependentScripts, RegistryNode};
use crate::error::Result;
use crate::value::{Collection, ScriptValue};

/// Sizes known only after layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    /// Width of the laid out content
    pub width: f64,

    /// Height of the laid out content
    pub height: f64,

    /// Number of lines of laid out text
    pub lines: i64,
}

/// Receives the change mask of a style after each render cycle.
pub trait StyleListener: Send + Sync {
    /// Called when `style` changed in the ways given by `changes`.
    fn style_changed(&self, style: &str, changes: ChangeMask);
}

/// One scriptable property of a style, whatever its value type.
trait Property {
    fn is_scripted(&self) -> bool;
    fn is_content_dependent(&self) -> bool;
    fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()>;
    fn check_content_dependency(&mut self, ctx: &mut Context) -> Result<bool>;
    fn update(&mut self, ctx: &mut Context) -> Result<bool>;
    fn snapshot(&self) -> ScriptValue;
}

impl<T> Property for Scriptable<T>
where
    T: FromScript + PartialEq + Clone + Into<ScriptValue>,
{
    fn is_scripted(&self) -> bool {
        Scriptable::is_scripted(self)
    }

    fn is_content_dependent(&self) -> bool {
        Scriptable::is_content_dependent(self)
    }

    fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()> {
        Scriptable::init_dependencies(self, ctx, dep)
    }

    fn check_content_dependency(&mut self, ctx: &mut Context) -> Result<bool> {
        Scriptable::check_content_dependency(self, ctx)
    }

    fn update(&mut self, ctx: &mut Context) -> Result<bool> {
        Scriptable::update(self, ctx)
    }

    fn snapshot(&self) -> ScriptValue {
        self.value().clone().into()
    }
}

/// How a field is drawn.
///
/// Geometry changes report [`ChangeMask::SIZE`], visibility reports
/// [`ChangeMask::OTHER`], and the mask image reports [`ChangeMask::MASK`].
pub struct Style {
    name: String,

    /// Distance from the left edge of the card
    pub left: Scriptable<f64>,

    /// Distance from the top edge of the card
    pub top: Scriptable<f64>,

    /// Width of the box
    pub width: Scriptable<f64>,

    /// Height of the box
    pub height: Scriptable<f64>,

    /// Rotation in degrees
    pub angle: Scriptable<f64>,

    /// Whether the field is drawn at all
    pub visible: Scriptable<bool>,

    /// Name of the mask image, empty for none
    pub mask: Scriptable<String>,

    content: Option<Measurement>,
    dependents: Arc<DependentScripts>,
    listeners: Vec<Arc<dyn StyleListener>>,
}

impl fmt::Debug for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Style")
            .field("name", &self.name)
            .field("left", self.left.value())
            .field("top", self.top.value())
            .field("width", self.width.value())
            .field("height", self.height.value())
            .field("angle", self.angle.value())
            .field("visible", self.visible.value())
            .field("mask", self.mask.value())
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

impl Style {
    /// A visible style with zero geometry and no scripts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            left: Scriptable::default(),
            top: Scriptable::default(),
            width: Scriptable::default(),
            height: Scriptable::default(),
            angle: Scriptable::default(),
            visible: Scriptable::new(true),
            mask: Scriptable::default(),
            content: None,
            dependents: Arc::new(DependentScripts::new()),
            listeners: Vec::new(),
        }
    }

    /// Name of the field this style belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> [(&'static str, ChangeMask, &dyn Property); 7] {
        [
            ("left", ChangeMask::SIZE, &self.left),
            ("top", ChangeMask::SIZE, &self.top),
            ("width", ChangeMask::SIZE, &self.width),
            ("height", ChangeMask::SIZE, &self.height),
            ("angle", ChangeMask::SIZE, &self.angle),
            ("visible", ChangeMask::OTHER, &self.visible),
            ("mask", ChangeMask::MASK, &self.mask),
        ]
    }

    fn properties_mut(&mut self) -> [(&'static str, ChangeMask, &mut dyn Property); 7] {
        [
            ("left", ChangeMask::SIZE, &mut self.left),
            ("top", ChangeMask::SIZE, &mut self.top),
            ("width", ChangeMask::SIZE, &mut self.width),
            ("height", ChangeMask::SIZE, &mut self.height),
            ("angle", ChangeMask::SIZE, &mut self.angle),
            ("visible", ChangeMask::OTHER, &mut self.visible),
            ("mask", ChangeMask::MASK, &mut self.mask),
        ]
    }

    // ═══════════════════════════════════════════════════════════════════
    // Measured Content
    // ═══════════════════════════════════════════════════════════════════

    /// The last measurement, if layout has run.
    pub fn content(&self) -> Option<Measurement> {
        self.content
    }

    /// Store a measurement from layout. Returns whether it changed.
    pub fn set_content(&mut self, measurement: Measurement) -> bool {
        if self.content == Some(measurement) {
            return false;
        }
        self.content = Some(measurement);
        true
    }

    /// Forget the measurement, as when the content was edited.
    pub fn clear_content(&mut self) {
        self.content = None;
    }

    /// Classify every property as content-dependent or not.
    ///
    /// Runs a dummy dependency pass per property script; the context's
    /// registry must already know the `content ...` owners.
    pub fn check_content_dependencies(&mut self, ctx: &mut Context) -> Result<()> {
        for (_, _, property) in self.properties_mut() {
            property.check_content_dependency(ctx)?;
        }
        Ok(())
    }

    /// True if any property script reads measured content.
    pub fn is_content_dependent(&self) -> bool {
        self.properties()
            .iter()
            .any(|(_, _, property)| property.is_content_dependent())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Script View
    // ═══════════════════════════════════════════════════════════════════

    /// The style as scripts see it. Content sizes appear once measured.
    pub fn snapshot(&self) -> ScriptValue {
        let mut collection = Collection::new();
        for (name, _, property) in self.properties() {
            collection.push(Some(name.to_string()), property.snapshot());
        }
        if let Some(content) = self.content {
            collection.push(Some("content width".to_string()), content.width.into());
            collection.push(Some("content height".to_string()), content.height.into());
            collection.push(Some("content lines".to_string()), content.lines.into());
        }
        ScriptValue::collection(collection)
    }

    /// Registry entry letting dependency passes find this style's owners.
    pub fn registry_node(&self) -> RegistryNode {
        let mut node = RegistryNode::group(&self.name);
        let names = self
            .properties()
            .map(|(name, _, _)| name)
            .into_iter()
            .chain(["content width", "content height", "content lines"]);
        for name in names {
            node = node.with_member(RegistryNode::owner(name, self.dependents.clone()));
        }
        node
    }

    // ═══════════════════════════════════════════════════════════════════
    // Listeners
    // ═══════════════════════════════════════════════════════════════════

    /// Subscribe to changes of this style.
    pub fn add_listener(&mut self, listener: Arc<dyn StyleListener>) {
        self.listeners.push(listener);
    }

    /// Unsubscribe a listener added earlier.
    pub fn remove_listener(&mut self, listener: &Arc<dyn StyleListener>) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Notify every listener of a change.
    pub fn tell_listeners(&self, changes: ChangeMask) {
        for listener in &self.listeners {
            listener.style_changed(&self.name, changes);
        }
    }
}

impl Owner for Style {
    fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()> {
        for (_, _, property) in self.properties() {
            property.init_dependencies(ctx, dep)?;
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context, only_content_dependent: bool) -> ChangeMask {
        let style = self.name.clone();
        let mut changes = ChangeMask::NONE;
        for (name, flag, property) in self.properties_mut() {
            if !property.is_scripted() || property.is_content_dependent() != only_content_dependent
            {
                continue;
            }
            match property.update(ctx) {
                Ok(true) => changes |= flag,
                Ok(false) => {}
                Err(err) => {
                    let report = ScriptErrorReport::new(ctx, &style, name, err);
                    ctx.report(&report);
                }
            }
        }
        if !changes.is_empty() {
            debug!(style = %style, %changes, only_content_dependent, "style changed");
        }
        changes
    }

    fn dependent_scripts(&self) -> &Arc<DependentScripts> {
        &self.dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Script, ScriptBuilder};
    use pretty_assertions::assert_eq;

    fn constant(value: ScriptValue) -> Arc<Script> {
        let mut b = ScriptBuilder::new();
        b.push_const(value);
        b.ret();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_update_masks_by_property() {
        let mut style = Style::new("title");
        style.width = Scriptable::scripted(0.0, constant(ScriptValue::Int(120)));
        style.mask = Scriptable::scripted(String::new(), constant(ScriptValue::string("m.png")));
        let mut ctx = Context::new();
        let changes = style.update(&mut ctx, false);
        assert_eq!(changes, ChangeMask::SIZE | ChangeMask::MASK);
        assert_eq!(*style.width.value(), 120.0);
        assert_eq!(style.update(&mut ctx, false), ChangeMask::NONE);
    }

    #[test]
    fn test_snapshot_includes_content_after_measurement() {
        let mut style = Style::new("text");
        let before = style.snapshot();
        assert!(before.as_collection().unwrap().get("content width").is_none());
        assert!(style.set_content(Measurement {
            width: 40.0,
            height: 12.0,
            lines: 2,
        }));
        let after = style.snapshot();
        assert_eq!(
            after.as_collection().unwrap().get("content lines"),
            Some(&ScriptValue::Int(2))
        );
    }

    #[test]
    fn test_registry_node_names_content_owners() {
        let style = Style::new("text");
        let node = style.registry_node();
        assert!(node.get("content width").is_some());
        assert!(node.get("left").is_some());
    }
}
