use serde::{Deserialize, Serialize};

/// What kind of entity an identifier was declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdKind {
    Constant,
    Variable,
    Procedure,
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdKind::Constant => write!(f, "constant"),
            IdKind::Variable => write!(f, "variable"),
            IdKind::Procedure => write!(f, "procedure"),
        }
    }
}

/// Resolved compile-time facts about one identifier occurrence.
///
/// `offset` is the cell's distance from the frame pointer of the declaring
/// scope (see [`local_offset`] and [`param_offset`]). `levels_outward` is the
/// number of static links to follow from the use site's frame to reach that
/// scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub kind: IdKind,
    pub offset: u32,
    pub levels_outward: u32,
}

impl Binding {
    pub fn new(kind: IdKind, offset: u32, levels_outward: u32) -> Self {
        Self {
            kind,
            offset,
            levels_outward,
        }
    }

    pub fn constant(offset: u32, levels_outward: u32) -> Self {
        Self::new(IdKind::Constant, offset, levels_outward)
    }

    pub fn variable(offset: u32, levels_outward: u32) -> Self {
        Self::new(IdKind::Variable, offset, levels_outward)
    }

    pub fn procedure(offset: u32, levels_outward: u32) -> Self {
        Self::new(IdKind::Procedure, offset, levels_outward)
    }
}

/// Frame offset of the `index`-th cell declared in a scope that declares
/// `cells` cells in total (constants, then variables, then procedures).
///
/// Cells are reserved in declaration order on a downward-growing stack and the
/// frame link sits below the last one, so the first declaration is farthest
/// from the frame pointer.
pub fn local_offset(index: u32, cells: u32) -> u32 {
    debug_assert!(index < cells);
    cells - index
}

/// Frame offset of parameter `index` of a procedure taking `params`
/// parameters whose body declares `cells` cells.
///
/// Above the locals sit the saved frame pointer, the saved return address and
/// the static link, then the arguments with the first one highest.
pub fn param_offset(index: u32, params: u32, cells: u32) -> u32 {
    debug_assert!(index < params);
    cells + 4 + (params - 1 - index)
}
