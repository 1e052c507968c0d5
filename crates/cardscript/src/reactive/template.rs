//! Templates: the fields and styles of one card, updated together

use std::collections::VecDeque;

use tracing::{debug, instrument};

use super::{ChangeMask, FieldValue, Measurement, Owner, Style};
use crate::context::Context;
use crate::dependency::{Dependency, DependencyKind, RegistryNode};
use crate::error::Result;
use crate::value::{Collection, ScriptValue};

/// The fields and styles of a card.
///
/// Scripts see the fields as `card` and the styles as `card style`.
/// Field `i` registers itself as `Dependency { CardField, i }` and style
/// `i` as `Dependency { Style, i }` with everything their scripts read,
/// so a change can be pushed to exactly the owners that read it.
///
/// Each update round has an age. An owner runs at most once per age,
/// which bounds propagation even when fields depend on each other in a
/// cycle.
#[derive(Debug, Default)]
pub struct Template {
    fields: Vec<FieldValue>,
    styles: Vec<Style>,

    /// Current update round
    age: u64,

    /// Round in which each field last ran
    field_age: Vec<u64>,

    /// Styles whose inputs changed since the last render cycle
    dirty_styles: Vec<bool>,
}

impl Template {
    /// Create an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, returning its index.
    pub fn add_field(&mut self, field: FieldValue) -> usize {
        self.fields.push(field);
        self.field_age.push(0);
        self.fields.len() - 1
    }

    /// Add a style, returning its index.
    pub fn add_style(&mut self, style: Style) -> usize {
        self.styles.push(style);
        self.dirty_styles.push(true);
        self.styles.len() - 1
    }

    /// All fields in order.
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// All styles in order.
    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Find a style by name.
    pub fn style(&self, name: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.name() == name)
    }

    /// Find a style by name, for editing.
    ///
    /// Edits made this way are picked up by the next
    /// [`invalidate_styles`](Self::invalidate_styles).
    pub fn style_mut(&mut self, name: &str) -> Option<&mut Style> {
        self.styles.iter_mut().find(|s| s.name() == name)
    }

    /// Make the next render cycle run every style script.
    pub fn invalidate_styles(&mut self) {
        self.dirty_styles.fill(true);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Linking
    // ═══════════════════════════════════════════════════════════════════

    /// Register the template with `ctx` and compute dependencies.
    ///
    /// Makes `card` and `card style` known to dependency passes, runs the
    /// passes for every owner, and classifies style properties as content
    /// dependent. Linking again after an edit starts from scratch.
    #[instrument(
        level = "debug",
        skip_all,
        fields(fields = self.fields.len(), styles = self.styles.len())
    )]
    pub fn link(&mut self, ctx: &mut Context) -> Result<()> {
        let mut card = RegistryNode::group("card");
        for field in &self.fields {
            field.dependent_scripts().clear();
            card = card.with_member(RegistryNode::owner(
                field.name(),
                field.dependent_scripts().clone(),
            ));
        }
        let mut card_style = RegistryNode::group("card style");
        for style in &self.styles {
            style.dependent_scripts().clear();
            card_style = card_style.with_member(style.registry_node());
        }
        ctx.registry_mut().register(card);
        ctx.registry_mut().register(card_style);

        for (i, field) in self.fields.iter().enumerate() {
            field.init_dependencies(ctx, &Dependency::new(DependencyKind::CardField, i))?;
        }
        for (i, style) in self.styles.iter_mut().enumerate() {
            style.init_dependencies(ctx, &Dependency::new(DependencyKind::Style, i))?;
            style.check_content_dependencies(ctx)?;
        }
        self.invalidate_styles();
        debug!("template linked");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Script View
    // ═══════════════════════════════════════════════════════════════════

    /// The fields as scripts see them.
    pub fn card_snapshot(&self) -> ScriptValue {
        let mut card = Collection::new();
        for field in &self.fields {
            card.push(Some(field.name().to_string()), field.value().clone());
        }
        ScriptValue::collection(card)
    }

    /// The styles as scripts see them.
    pub fn style_snapshot(&self) -> ScriptValue {
        let mut styles = Collection::new();
        for style in &self.styles {
            styles.push(Some(style.name().to_string()), style.snapshot());
        }
        ScriptValue::collection(styles)
    }

    /// Bind `card` and `card style` in the current scope.
    pub fn bind(&self, ctx: &mut Context) {
        ctx.set_variable("card", self.card_snapshot());
        ctx.set_variable("card style", self.style_snapshot());
    }

    // ═══════════════════════════════════════════════════════════════════
    // Field Updates
    // ═══════════════════════════════════════════════════════════════════

    /// Store user input in a field and update everything that reads it.
    ///
    /// Returns the names of the fields that changed, the edited one first.
    pub fn set_field(&mut self, ctx: &mut Context, name: &str, value: ScriptValue) -> Vec<String> {
        let Some(index) = self.fields.iter().position(|f| f.name() == name) else {
            return Vec::new();
        };
        if !self.fields[index].set_value(value) {
            return Vec::new();
        }
        self.age += 1;
        self.field_age[index] = self.age;
        let mut changed = vec![name.to_string()];
        let dependents = self.fields[index].dependent_scripts().list();
        let mut scope = ctx.scope_guard();
        self.propagate(&mut scope, dependents, &mut changed);
        changed
    }

    /// Run every field script once, pushing changes to dependents.
    ///
    /// Returns the names of the fields that changed.
    pub fn update_fields(&mut self, ctx: &mut Context) -> Vec<String> {
        self.age += 1;
        let mut changed = Vec::new();
        let mut scope = ctx.scope_guard();
        for index in 0..self.fields.len() {
            if self.field_age[index] == self.age {
                continue;
            }
            self.update_field(&mut scope, index, &mut changed);
        }
        changed
    }

    fn update_field(&mut self, ctx: &mut Context, index: usize, changed: &mut Vec<String>) {
        self.field_age[index] = self.age;
        self.bind(ctx);
        if self.fields[index].update(ctx, false).is_empty() {
            return;
        }
        changed.push(self.fields[index].name().to_string());
        let dependents = self.fields[index].dependent_scripts().list();
        self.propagate(ctx, dependents, changed);
    }

    fn propagate(&mut self, ctx: &mut Context, deps: Vec<Dependency>, changed: &mut Vec<String>) {
        let mut queue: VecDeque<Dependency> = deps.into();
        while let Some(dep) = queue.pop_front() {
            match dep.kind {
                DependencyKind::CardField => {
                    if self.field_age.get(dep.index).is_some_and(|age| *age < self.age) {
                        self.field_age[dep.index] = self.age;
                        self.bind(ctx);
                        if !self.fields[dep.index].update(ctx, false).is_empty() {
                            changed.push(self.fields[dep.index].name().to_string());
                            queue.extend(self.fields[dep.index].dependent_scripts().list());
                        }
                    }
                }
                DependencyKind::Style => {
                    if let Some(dirty) = self.dirty_styles.get_mut(dep.index) {
                        *dirty = true;
                    }
                }
                _ => {}
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Render Cycle
    // ═══════════════════════════════════════════════════════════════════

    /// Run one full update cycle.
    ///
    /// Fields update first, then phase 1 runs the style scripts that do not
    /// read measured content, `measure` lays out each style, and phase 2
    /// runs the content-dependent scripts of styles whose inputs changed.
    /// Listeners of each changed style are told once, at the end.
    ///
    /// Each phase sweeps the styles in order until nothing is left to run,
    /// so a style reading a later one still settles within the cycle. A
    /// style runs at most once per sweep and there are at most as many
    /// sweeps as styles; whatever is still dirty then, such as a cycle
    /// of styles that keeps changing, carries over to the next call.
    /// Styles reading a value that changed in phase 2 run their other
    /// scripts in the next cycle's phase 1, after this cycle's layout.
    ///
    /// Returns the union of all style changes.
    #[instrument(level = "debug", skip_all)]
    pub fn render_cycle<F>(&mut self, ctx: &mut Context, mut measure: F) -> ChangeMask
    where
        F: FnMut(&Style) -> Option<Measurement>,
    {
        self.update_fields(ctx);

        let mut scope = ctx.scope_guard();
        let mut masks = vec![ChangeMask::NONE; self.styles.len()];
        let mut content_dirty = self.dirty_styles.clone();

        // Phase 1
        let mut structure_dirty = std::mem::take(&mut self.dirty_styles);
        for _ in 0..self.styles.len() {
            let mut ran = false;
            for index in 0..self.styles.len() {
                if !structure_dirty[index] {
                    continue;
                }
                structure_dirty[index] = false;
                ran = true;
                self.bind(&mut scope);
                let mask = self.styles[index].update(&mut scope, false);
                if !mask.is_empty() {
                    masks[index] |= mask;
                    for reader in self.readers(index) {
                        structure_dirty[reader] = true;
                        content_dirty[reader] = true;
                    }
                }
            }
            if !ran {
                break;
            }
        }

        // Measurement
        for index in 0..self.styles.len() {
            if let Some(measurement) = measure(&self.styles[index]) {
                if self.styles[index].set_content(measurement) {
                    for reader in self.readers(index) {
                        content_dirty[reader] = true;
                    }
                }
            }
        }

        // Phase 2
        for _ in 0..self.styles.len() {
            let mut ran = false;
            for index in 0..self.styles.len() {
                if !content_dirty[index] {
                    continue;
                }
                content_dirty[index] = false;
                if !self.styles[index].is_content_dependent() {
                    continue;
                }
                ran = true;
                self.bind(&mut scope);
                let mask = self.styles[index].update(&mut scope, true);
                if !mask.is_empty() {
                    masks[index] |= mask;
                    for reader in self.readers(index) {
                        structure_dirty[reader] = true;
                        content_dirty[reader] = true;
                    }
                }
            }
            if !ran {
                break;
            }
        }
        drop(scope);

        // Left over for the next cycle
        for (dirty, content) in structure_dirty.iter_mut().zip(&content_dirty) {
            *dirty |= *content;
        }
        self.dirty_styles = structure_dirty;

        let mut total = ChangeMask::NONE;
        for (style, mask) in self.styles.iter().zip(masks) {
            if !mask.is_empty() {
                style.tell_listeners(mask);
                total |= mask;
            }
        }
        total
    }

    /// Indices of the styles whose scripts read style `index`.
    fn readers(&self, index: usize) -> Vec<usize> {
        self.styles[index]
            .dependent_scripts()
            .list()
            .into_iter()
            .filter(|dep| dep.kind == DependencyKind::Style && dep.index < self.styles.len())
            .map(|dep| dep.index)
            .collect()
    }
}
