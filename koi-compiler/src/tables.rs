//! Process-wide symbol tables built by Pass 0, augmented by Pass 1.6/1.7,
//! read by Pass 2 onward ("Tables").

use koi_ast::{
    ConstDef, EnumDef, Function, PerkDef, PerkImpl, StructDef, Type, TypeParam,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct StructEntry {
    pub def: StructDef,
    pub is_pub: bool,
}

#[derive(Debug, Clone)]
pub struct EnumEntry {
    pub def: EnumDef,
    pub is_pub: bool,
}

#[derive(Debug, Clone)]
pub struct GenericStructEntry {
    pub def: StructDef,
    pub type_params: Vec<TypeParam>,
}

#[derive(Debug, Clone)]
pub struct GenericEnumEntry {
    pub def: EnumDef,
    pub type_params: Vec<TypeParam>,
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub def: Function,
}

#[derive(Debug, Clone)]
pub struct GenericFunctionEntry {
    pub def: Function,
    pub type_params: Vec<TypeParam>,
}

#[derive(Debug, Clone)]
pub struct ExtensionEntry {
    pub target_type: Type,
    pub method: Function,
}

#[derive(Debug, Clone)]
pub struct PerkImplEntry {
    pub perk_impl: PerkImpl,
}

/// Shared tables threaded through Passes 0-4. Passes 0, 1.6, and 1.7 mutate
/// them ("Resource sharing within a pass"); the rest only read.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub structs: HashMap<String, StructEntry>,
    pub enums: HashMap<String, EnumEntry>,
    pub generic_structs: HashMap<String, GenericStructEntry>,
    pub generic_enums: HashMap<String, GenericEnumEntry>,
    pub functions: HashMap<String, FunctionEntry>,
    pub generic_functions: HashMap<String, GenericFunctionEntry>,
    /// Keyed by (target type canonical name, method name).
    pub extensions: HashMap<(String, String), ExtensionEntry>,
    pub perks: HashMap<String, PerkDef>,
    /// Keyed by (target type canonical name, perk name).
    pub perk_impls: HashMap<(String, String), PerkImplEntry>,
    pub constants: HashMap<String, ConstDef>,
    /// Mangled names of monomorphized functions produced by Pass 1.6,
    /// appended to the program's function list so Pass 4 emits them.
    pub monomorphized_functions: Vec<Function>,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_struct(&self, name: &str) -> Option<&StructEntry> {
        self.structs.get(name)
    }

    pub fn lookup_enum(&self, name: &str) -> Option<&EnumEntry> {
        self.enums.get(name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    pub fn lookup_extension(&self, target: &str, method: &str) -> Option<&ExtensionEntry> {
        self.extensions.get(&(target.to_string(), method.to_string()))
    }

    /// A name is defined as *some* top-level symbol, regardless of kind —
    /// used by Pass 0's duplicate-definition check.
    pub fn is_defined(&self, name: &str) -> bool {
        self.structs.contains_key(name)
            || self.enums.contains_key(name)
            || self.generic_structs.contains_key(name)
            || self.generic_enums.contains_key(name)
            || self.functions.contains_key(name)
            || self.generic_functions.contains_key(name)
            || self.perks.contains_key(name)
            || self.constants.contains_key(name)
    }
}
