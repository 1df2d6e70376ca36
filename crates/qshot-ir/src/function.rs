//! Functions and basic blocks.

use crate::instruction::Instruction;
use crate::types::Type;

/// A formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Type,
    pub attrs: Vec<String>,
    pub name: Option<String>,
}

impl Param {
    /// An unnamed parameter without attributes.
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            attrs: Vec::new(),
            name: None,
        }
    }
}

/// A labelled basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

/// A function definition or declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// Linkage, visibility and return attributes written before the return type.
    pub qualifiers: Vec<String>,
    pub ret_ty: Type,
    pub params: Vec<Param>,
    pub variadic: bool,
    /// Words written after the parameter list (`local_unnamed_addr`, ...).
    pub trailing: Vec<String>,
    pub attr_groups: Vec<u32>,
    /// Empty for declarations.
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// A bodiless declaration.
    pub fn declaration(name: impl Into<String>, ret_ty: Type, params: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            qualifiers: Vec::new(),
            ret_ty,
            params: params.into_iter().map(Param::new).collect(),
            variadic: false,
            trailing: Vec::new(),
            attr_groups: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Whether this is a `declare`.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All instructions in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Find a block by label.
    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Names of the directly called functions, first occurrence order.
    pub fn callees(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (callee, _) in self.instructions().filter_map(Instruction::as_call) {
            if !seen.contains(&callee) {
                seen.push(callee);
            }
        }
        seen
    }
}
