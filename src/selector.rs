use uuid::Uuid;

use crate::models::{BusinessUnitOption, BusinessUnitSelectorView};

/// BusinessUnitSink
///
/// Whatever owns the selected-BU pointer. `SessionContext` is the production owner.
pub trait BusinessUnitSink {
    fn current_bu_id(&self) -> Option<Uuid>;
    /// Called once per selection change, never for a no-op.
    fn select_bu(&mut self, id: Uuid);
}

/// Returned by `choose` for an id that is not among the listed options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownBusinessUnit(pub Uuid);

/// BusinessUnitSelector
///
/// The BU dropdown: options ordered by name, plus the auto-selection policy applied when
/// a list is (re)loaded, e.g. after an admin switches organizations.
#[derive(Debug, Clone, Default)]
pub struct BusinessUnitSelector {
    options: Vec<BusinessUnitOption>,
}

impl BusinessUnitSelector {
    /// Sorts `options` by name.
    pub fn new(mut options: Vec<BusinessUnitOption>) -> Self {
        // Stable, so equal names keep the backend's order.
        options.sort_by(|a, b| a.name.cmp(&b.name));
        Self { options }
    }

    pub fn options(&self) -> &[BusinessUnitOption] {
        &self.options
    }

    /// Nothing is rendered for an empty list.
    pub fn is_visible(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.options.iter().any(|option| option.id == id)
    }

    /// The id to auto-select: the first option, when nothing valid is selected.
    pub fn reconcile(&self, current: Option<Uuid>) -> Option<Uuid> {
        match current {
            Some(id) if self.contains(id) => None,
            _ => self.options.first().map(|option| option.id),
        }
    }

    /// Applies `reconcile` to the sink. Returns true when a selection was made, in which
    /// case `select_bu` was called exactly once.
    pub fn sync(&self, sink: &mut impl BusinessUnitSink) -> bool {
        match self.reconcile(sink.current_bu_id()) {
            Some(id) => {
                tracing::debug!(business_unit_id = %id, "auto-selecting business unit");
                sink.select_bu(id);
                true
            }
            None => false,
        }
    }

    /// An explicit user choice. Only listed units can be chosen.
    pub fn choose(
        &self,
        sink: &mut impl BusinessUnitSink,
        id: Uuid,
    ) -> Result<(), UnknownBusinessUnit> {
        if !self.contains(id) {
            return Err(UnknownBusinessUnit(id));
        }
        sink.select_bu(id);
        Ok(())
    }

    /// Render model for the dropdown. A selection outside the list renders as none.
    pub fn view(&self, selected: Option<Uuid>) -> BusinessUnitSelectorView {
        BusinessUnitSelectorView {
            visible: self.is_visible(),
            selected_bu_id: selected.filter(|id| self.contains(*id)),
            options: self.options.clone(),
        }
    }
}
