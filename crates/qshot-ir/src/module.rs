//! Module contents and the [`Module`] value passed between stages.

use rustc_hash::FxHashMap;

use crate::bitcode;
use crate::error::BitcodeResult;
use crate::function::Function;
use crate::types::Type;
use crate::value::Constant;

/// Attribute marking the program entry point.
pub const ENTRY_POINT_ATTR: &str = "entry_point";

/// Named metadata holding the module flags.
pub const MODULE_FLAGS: &str = "llvm.module.flags";

/// `%Name = type opaque` or `%Name = type { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    /// `None` for opaque types.
    pub body: Option<Vec<Type>>,
}

/// Global initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// `c"..."` byte string.
    Bytes(Vec<u8>),
    /// Any other constant.
    Constant(Constant),
}

/// A global variable or constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub qualifiers: Vec<String>,
    pub is_constant: bool,
    pub ty: Type,
    pub initializer: Option<Initializer>,
    pub align: Option<u64>,
}

impl Global {
    /// A private constant byte string, as used for output labels.
    pub fn byte_string(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            qualifiers: vec!["private".to_string()],
            is_constant: true,
            ty: Type::Array(bytes.len() as u64, Box::new(Type::Int(8))),
            initializer: Some(Initializer::Bytes(bytes)),
            align: None,
        }
    }

    /// The initializer as text, without the trailing NUL.
    pub fn c_string(&self) -> Option<&str> {
        match &self.initializer {
            Some(Initializer::Bytes(bytes)) => {
                let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
                std::str::from_utf8(bytes).ok()
            }
            _ => None,
        }
    }
}

/// One entry of an attribute group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Enum attribute such as `nounwind`.
    Word(String),
    /// String attribute: `"key"` or `"key"="value"`.
    Str { key: String, value: Option<String> },
}

/// `attributes #N = { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGroup {
    pub id: u32,
    pub attributes: Vec<Attribute>,
}

/// An element of a metadata tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataItem {
    /// Typed constant (`i32 1`, `i1 false`).
    Value(Type, Constant),
    /// `!"text"`
    Str(String),
    /// `!N`
    Node(u32),
    /// `null`
    Null,
}

impl MetadataItem {
    /// Integer payload of a typed constant.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Value(_, Constant::Int(v)) => Some(*v),
            Self::Value(_, Constant::Bool(b)) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Boolean payload of a typed constant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Value(_, Constant::Bool(b)) => Some(*b),
            Self::Value(Type::Int(1), Constant::Int(v)) => Some(*v != 0),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// `!N = [distinct] !{ ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataNode {
    pub id: u32,
    pub distinct: bool,
    pub items: Vec<MetadataItem>,
}

/// `!name = !{!0, !1}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMetadata {
    pub name: String,
    pub nodes: Vec<u32>,
}

/// A `!llvm.module.flags` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleFlag<'a> {
    pub behavior: i64,
    pub key: &'a str,
    pub value: &'a MetadataItem,
}

/// Everything a textual IR file declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrModule {
    pub source_filename: Option<String>,
    pub data_layout: Option<String>,
    pub triple: Option<String>,
    pub type_defs: Vec<TypeDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub attribute_groups: Vec<AttributeGroup>,
    pub named_metadata: Vec<NamedMetadata>,
    pub metadata: Vec<MetadataNode>,
}

impl IrModule {
    /// Find a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find a global by name.
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Find an attribute group by id.
    pub fn attribute_group(&self, id: u32) -> Option<&AttributeGroup> {
        self.attribute_groups.iter().find(|g| g.id == id)
    }

    /// Attributes attached to a function through its `#N` groups, in order.
    pub fn function_attributes<'a>(&'a self, function: &'a Function) -> Vec<&'a Attribute> {
        function
            .attr_groups
            .iter()
            .filter_map(|id| self.attribute_group(*id))
            .flat_map(|g| g.attributes.iter())
            .collect()
    }

    /// String attributes of a function as `(key, value)` pairs; later groups
    /// override earlier ones.
    pub fn string_attributes<'a>(&'a self, function: &'a Function) -> Vec<(&'a str, Option<&'a str>)> {
        let mut out: Vec<(&str, Option<&str>)> = Vec::new();
        for attr in self.function_attributes(function) {
            if let Attribute::Str { key, value } = attr {
                if let Some(slot) = out.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = value.as_deref();
                } else {
                    out.push((key, value.as_deref()));
                }
            }
        }
        out
    }

    /// Whether the function carries the entry-point attribute.
    pub fn is_entry_point(&self, function: &Function) -> bool {
        self.function_attributes(function).into_iter().any(
            |a| matches!(a, Attribute::Str { key, .. } if key == ENTRY_POINT_ATTR),
        )
    }

    /// All functions marked as entry points.
    pub fn entry_points(&self) -> Vec<&Function> {
        self.functions
            .iter()
            .filter(|f| self.is_entry_point(f))
            .collect()
    }

    /// The single entry point, if there is exactly one.
    pub fn entry_point(&self) -> Option<&Function> {
        match self.entry_points().as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Find a metadata node by id.
    pub fn metadata_node(&self, id: u32) -> Option<&MetadataNode> {
        self.metadata.iter().find(|n| n.id == id)
    }

    /// Find named metadata.
    pub fn named_metadata(&self, name: &str) -> Option<&NamedMetadata> {
        self.named_metadata.iter().find(|m| m.name == name)
    }

    /// Decoded module flags, skipping malformed entries.
    pub fn module_flags(&self) -> Vec<ModuleFlag<'_>> {
        let Some(named) = self.named_metadata(MODULE_FLAGS) else {
            return Vec::new();
        };
        named
            .nodes
            .iter()
            .filter_map(|id| self.metadata_node(*id))
            .filter_map(|node| match node.items.as_slice() {
                [behavior, MetadataItem::Str(key), value] => Some(ModuleFlag {
                    behavior: behavior.as_int()?,
                    key,
                    value,
                }),
                _ => None,
            })
            .collect()
    }

    /// Value of one module flag.
    pub fn module_flag(&self, key: &str) -> Option<&MetadataItem> {
        self.module_flags()
            .into_iter()
            .find(|f| f.key == key)
            .map(|f| f.value)
    }

    /// Next unused metadata node id.
    pub fn next_metadata_id(&self) -> u32 {
        self.metadata.iter().map(|n| n.id + 1).max().unwrap_or(0)
    }

    /// Map from global name to its label text, for byte-string globals.
    pub fn string_globals(&self) -> FxHashMap<&str, &str> {
        self.globals
            .iter()
            .filter_map(|g| g.c_string().map(|s| (g.name.as_str(), s)))
            .collect()
    }
}

/// A loaded program: its parsed contents plus the canonical bitcode bytes.
///
/// Modules are values. Stages take one by value and hand back a new one;
/// nothing mutates a `Module` after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    ir: IrModule,
    bitcode: Vec<u8>,
}

impl Module {
    /// Build a module from parsed contents, encoding its bitcode.
    pub fn from_ir(ir: IrModule) -> Self {
        let bitcode = bitcode::encode(&ir);
        Self { ir, bitcode }
    }

    /// Load a module from a bitcode artifact.
    pub fn from_bitcode(bytes: &[u8]) -> BitcodeResult<Self> {
        let ir = bitcode::decode(bytes)?;
        Ok(Self {
            ir,
            bitcode: bytes.to_vec(),
        })
    }

    /// Parsed contents.
    pub fn ir(&self) -> &IrModule {
        &self.ir
    }

    /// Canonical bitcode bytes.
    pub fn bitcode(&self) -> &[u8] {
        &self.bitcode
    }

    /// Give up the bitcode and keep the parsed contents.
    pub fn into_ir(self) -> IrModule {
        self.ir
    }

    /// Decompile to textual IR.
    pub fn to_ir_text(&self) -> String {
        crate::emitter::emit(&self.ir)
    }
}
