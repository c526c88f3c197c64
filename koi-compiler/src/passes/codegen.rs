//! Pass 4: LLVM IR emission.
//!
//! `CodeGen<'ctx>` holds `context`/`module`/`builder` plus per-kind lookup
//! tables, with an entry-block-alloca + param-store prologue per function.
//! Unlike `run_frontend`'s passes, this one needs an `inkwell::context::Context`
//! with a caller-controlled lifetime, so it isn't wired into `run_frontend`
//! (see `passes::mod` doc comment) — the CLI calls it directly.

pub mod builtins;
mod expressions;
mod statements;

use crate::mangling;
use crate::stdlib::{StdlibRegistry, RUNTIME_HELPERS};
use crate::tables::{ExtensionEntry, SymbolTables};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicType, BasicTypeEnum, StructType};
use inkwell::values::{FunctionValue, PointerValue};
use inkwell::AddressSpace;
use koi_ast::{Function, Item, Program, Type};
use std::cell::Cell;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("undefined name `{0}` survived type validation")]
    UndefinedName(String),
    #[error("no LLVM layout registered for type `{0}`")]
    UnknownLayout(String),
    #[error("LLVM builder error: {0}")]
    Builder(String),
    #[error("`{0}` is not a valid entry point (expected `main i32`)")]
    BadEntryPoint(String),
}

impl From<inkwell::builder::BuilderError> for CodegenError {
    fn from(e: inkwell::builder::BuilderError) -> Self {
        CodegenError::Builder(e.to_string())
    }
}

/// A function-local binding: its slot, its semantic type (for RAII/move
/// dispatch), and whether it's a caller-owned receiver/param vs. a binding
/// introduced inside the function body — this decides whether the slot
/// participates in this frame's RAII cleanup at all.
pub(crate) struct VarSlot<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: Type,
    pub is_param: bool,
    pub moved: Cell<bool>,
}

/// Per-`while` loop targets for `break`/`continue`.
pub(crate) struct LoopTargets<'ctx> {
    pub cond_bb: BasicBlock<'ctx>,
    pub end_bb: BasicBlock<'ctx>,
}

pub struct CodeGen<'ctx> {
    pub(crate) context: &'ctx Context,
    pub(crate) module: Module<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) tables: &'ctx SymbolTables,
    pub(crate) stdlib: StdlibRegistry,

    pub(crate) struct_types: HashMap<String, StructType<'ctx>>,
    pub(crate) enum_types: HashMap<String, StructType<'ctx>>,
    pub(crate) functions: HashMap<String, FunctionValue<'ctx>>,
    pub(crate) runtime_fns: HashMap<&'static str, FunctionValue<'ctx>>,

    pub(crate) scope_stack: Vec<HashMap<String, VarSlot<'ctx>>>,
    pub(crate) loop_stack: Vec<LoopTargets<'ctx>>,
    pub(crate) current_function: Option<FunctionValue<'ctx>>,
    /// The function's declared (non-Result-wrapped) return type, used to
    /// build `Result.Ok(value)`/`Result.Err(e)` at every `return`.
    pub(crate) current_return_type: Option<Type>,
    pub(crate) current_err_type: Option<Type>,
    /// `None` for extension/perk methods, which return a bare value.
    pub(crate) current_is_extension: bool,
    pub(crate) string_literals: HashMap<String, PointerValue<'ctx>>,
}

/// Emits `program` into a fresh module named `module_name`, returning the
/// populated module for the caller to verify/print/write to disk.
pub fn run<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    program: &Program,
    tables: &'ctx SymbolTables,
) -> Result<Module<'ctx>, CodegenError> {
    let module = context.create_module(module_name);
    let builder = context.create_builder();

    let mut codegen = CodeGen {
        context,
        module,
        builder,
        tables,
        stdlib: StdlibRegistry::new(),
        struct_types: HashMap::new(),
        enum_types: HashMap::new(),
        functions: HashMap::new(),
        runtime_fns: HashMap::new(),
        scope_stack: Vec::new(),
        loop_stack: Vec::new(),
        current_function: None,
        current_return_type: None,
        current_err_type: None,
        current_is_extension: false,
        string_literals: HashMap::new(),
    };

    codegen.declare_runtime_helpers();
    codegen.register_layouts();
    codegen.register_builtin_generic_layouts(program);
    codegen.declare_functions(program)?;
    codegen.emit_functions(program)?;
    codegen.emit_main_wrapper()?;

    Ok(codegen.module)
}

impl<'ctx> CodeGen<'ctx> {
    fn i8_ptr(&self) -> inkwell::types::PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    /// Declares the libc/runtime symbols generated code needs reachable.
    /// Signatures are the ordinary C ones; `fprintf` is the sole variadic.
    fn declare_runtime_helpers(&mut self) {
        let i8_ptr = self.i8_ptr();
        let i32_t = self.context.i32_type();
        let i64_t = self.context.i64_type();

        let sigs: &[(&str, &[BasicTypeEnum<'ctx>], BasicTypeEnum<'ctx>, bool)] = &[
            ("malloc", &[i64_t.into()], i8_ptr.into(), false),
            ("realloc", &[i8_ptr.into(), i64_t.into()], i8_ptr.into(), false),
            ("memcpy", &[i8_ptr.into(), i8_ptr.into(), i64_t.into()], i8_ptr.into(), false),
            ("memset", &[i8_ptr.into(), i32_t.into(), i64_t.into()], i8_ptr.into(), false),
            ("strlen", &[i8_ptr.into()], i64_t.into(), false),
            ("strcmp", &[i8_ptr.into(), i8_ptr.into()], i32_t.into(), false),
            ("fgets", &[i8_ptr.into(), i32_t.into(), i8_ptr.into()], i8_ptr.into(), false),
            ("fopen", &[i8_ptr.into(), i8_ptr.into()], i8_ptr.into(), false),
            ("fclose", &[i8_ptr.into()], i32_t.into(), false),
            ("fprintf", &[i8_ptr.into(), i8_ptr.into()], i32_t.into(), true),
        ];
        for (name, params, ret, variadic) in sigs {
            let param_meta: Vec<_> = params.iter().map(|p| (*p).into()).collect();
            let fn_type = ret.fn_type(&param_meta, *variadic);
            let f = self.module.add_function(name, fn_type, Some(Linkage::External));
            self.runtime_fns.insert(name, f);
        }
        // `free` returns void, unlike the rest of the table above.
        let free_type = self.context.void_type().fn_type(&[i8_ptr.into()], false);
        let free_fn = self.module.add_function("free", free_type, Some(Linkage::External));
        self.runtime_fns.insert("free", free_fn);

        debug_assert_eq!(RUNTIME_HELPERS.len(), self.runtime_fns.len());
    }

    /// Registers a named LLVM struct type for every concrete struct/enum
    /// known to `tables` (including monomorphized instances, which
    /// Pass 1.6 already inserted under their canonical name). Enums are
    /// laid out `{i32 tag, [N x i8] data}` where `N` is the widest
    /// variant's payload size; structs are laid out field-by-field in
    /// declaration order.
    fn register_layouts(&mut self) {
        let struct_names: Vec<String> = self.tables.structs.keys().cloned().collect();
        for name in &struct_names {
            self.struct_types.insert(name.clone(), self.context.opaque_struct_type(name));
        }
        let enum_names: Vec<String> = self.tables.enums.keys().cloned().collect();
        for name in &enum_names {
            self.enum_types.insert(name.clone(), self.context.opaque_struct_type(name));
        }

        for name in &struct_names {
            let entry = &self.tables.structs[name];
            let field_types: Vec<BasicTypeEnum> =
                entry.def.fields.iter().map(|f| self.llvm_type(&f.ty)).collect();
            self.struct_types[name].set_body(&field_types, false);
        }
        for name in &enum_names {
            let entry = &self.tables.enums[name];
            let payload_bytes = entry
                .def
                .variants
                .iter()
                .map(|v| v.associated_types.iter().map(|t| self.size_of_type(t)).sum::<u64>())
                .max()
                .unwrap_or(0)
                .max(1);
            let i8_t = self.context.i8_type();
            let payload = i8_t.array_type(payload_bytes as u32);
            let body: Vec<BasicTypeEnum> = vec![self.context.i32_type().into(), payload.into()];
            self.enum_types[name].set_body(&body, false);
        }
    }

    /// Conservative byte size used only to size an enum's payload array;
    /// not required to match the target's true ABI layout since the
    /// payload is opaque bytes reinterpreted by the field-extraction code.
    pub(crate) fn size_of_type(&self, ty: &Type) -> u64 {
        match ty {
            Type::I8 | Type::U8 | Type::Bool => 1,
            Type::I16 | Type::U16 => 2,
            Type::I32 | Type::U32 | Type::F32 => 4,
            Type::I64 | Type::U64 | Type::F64 => 8,
            Type::Blank => 0,
            Type::String => 16, // {i8*, i32} fat pointer, padded
            Type::DynamicArray(_) => 16, // {i32, i32, T*}
            Type::Array(elem, len) => self.size_of_type(elem) * (*len as u64),
            Type::Struct { name, generic_args } => {
                let key = if generic_args.is_empty() { name.clone() } else { mangling::canonical_name(name, generic_args) };
                self.tables
                    .structs
                    .get(&key)
                    .map(|e| e.def.fields.iter().map(|f| self.size_of_type(&f.ty)).sum())
                    .unwrap_or(8)
            }
            Type::Enum { name, generic_args } => {
                let key = if generic_args.is_empty() { name.clone() } else { mangling::canonical_name(name, generic_args) };
                self.tables
                    .enums
                    .get(&key)
                    .map(|e| {
                        4 + e
                            .def
                            .variants
                            .iter()
                            .map(|v| v.associated_types.iter().map(|t| self.size_of_type(t)).sum::<u64>())
                            .max()
                            .unwrap_or(0)
                    })
                    .unwrap_or(8)
            }
            Type::GenericRef { base_name, type_args } if base_name == "Own" => {
                let _ = type_args;
                8
            }
            Type::Reference { .. } | Type::Pointer(_) => 8,
            _ => 8,
        }
    }

    /// `Type` → LLVM type lowering.
    pub(crate) fn llvm_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        match ty {
            Type::I8 | Type::U8 => self.context.i8_type().into(),
            Type::I16 | Type::U16 => self.context.i16_type().into(),
            Type::I32 | Type::U32 => self.context.i32_type().into(),
            Type::I64 | Type::U64 => self.context.i64_type().into(),
            Type::F32 => self.context.f32_type().into(),
            Type::F64 => self.context.f64_type().into(),
            Type::Bool => self.context.bool_type().into(),
            Type::Blank => self.context.struct_type(&[], false).into(),
            Type::String => {
                // Fat pointer: { i8*, i32 }.
                self.context.struct_type(&[self.i8_ptr().into(), self.context.i32_type().into()], false).into()
            }
            Type::Stdin | Type::Stdout | Type::Stderr | Type::FileStream => self.i8_ptr().into(),
            Type::Array(elem, len) => self.llvm_type(elem).array_type(*len as u32).into(),
            Type::DynamicArray(elem) => {
                // { i32 len, i32 cap, T* data }.
                let elem_ptr = self.llvm_type(elem).ptr_type(AddressSpace::default());
                self.context
                    .struct_type(
                        &[
                            self.context.i32_type().into(),
                            self.context.i32_type().into(),
                            elem_ptr.into(),
                        ],
                        false,
                    )
                    .into()
            }
            Type::Struct { name, generic_args } => {
                let key = if generic_args.is_empty() {
                    name.clone()
                } else {
                    mangling::canonical_name(name, generic_args)
                };
                self.struct_types.get(&key).map(|t| (*t).into()).unwrap_or_else(|| self.context.i64_type().into())
            }
            Type::Enum { name, generic_args } => {
                let key = if generic_args.is_empty() {
                    name.clone()
                } else {
                    mangling::canonical_name(name, generic_args)
                };
                self.enum_types.get(&key).map(|t| (*t).into()).unwrap_or_else(|| self.context.i64_type().into())
            }
            Type::Reference { referenced, .. } | Type::Pointer(referenced) => {
                let _ = referenced;
                self.i8_ptr().into()
            }
            Type::Iterator(_) => {
                // { i32 index, i32 capacity_with_kind_bits, i8* source }.
                self.context
                    .struct_type(
                        &[
                            self.context.i32_type().into(),
                            self.context.i32_type().into(),
                            self.i8_ptr().into(),
                        ],
                        false,
                    )
                    .into()
            }
            Type::Result { ok, err } => {
                let name = mangling::canonical_name("Result", &[(**ok).clone(), (**err).clone()]);
                self.enum_types
                    .get(&name)
                    .map(|t| (*t).into())
                    .unwrap_or_else(|| self.context.i64_type().into())
            }
            Type::GenericRef { base_name, type_args } => {
                // `Own<T>` never gets a named struct (it's just a heap-box
                // pointer); resolve it directly rather than via a layout lookup.
                if base_name == "Own" {
                    return self.i8_ptr().into();
                }
                let key = mangling::canonical_name(base_name, type_args);
                self.enum_types
                    .get(&key)
                    .or_else(|| self.struct_types.get(&key))
                    .map(|t| (*t).into())
                    .unwrap_or_else(|| self.context.i64_type().into())
            }
            Type::TypeParameter(_) | Type::Unknown(_) => self.context.i64_type().into(),
        }
    }

    /// Declares every function (signature only) before emitting any body,
    /// so forward references and mutual recursion resolve.
    fn declare_functions(&mut self, program: &Program) -> Result<(), CodegenError> {
        for item in &program.items {
            match item {
                Item::Function(f) => self.declare_function(f, &f.name, false),
                Item::PerkImpl(p) => {
                    for m in &p.methods {
                        let mangled = format!("{}__{}", mangling::type_name(&p.target_type), m.name);
                        self.declare_function(m, &mangled, true);
                    }
                }
                _ => {}
            }
        }
        // `tables.extensions` is Pass 0's (and Pass 1.7's) full extension
        // registry: every `Item::Extension` block the program wrote plus
        // every hash method `hash_registration` synthesized — the latter
        // have no `Item` of their own, so this is the only place they're
        // ever declared.
        for (mangled, entry) in &self.extension_entries() {
            self.declare_function(&entry.method, mangled, true);
        }
        for f in &self.tables.monomorphized_functions.clone() {
            self.declare_function(f, &f.name, f.receiver.is_some());
        }
        Ok(())
    }

    fn extension_entries(&self) -> Vec<(String, ExtensionEntry)> {
        self.tables
            .extensions
            .values()
            .map(|entry| {
                let mangled = format!("{}__{}", mangling::type_name(&entry.target_type), entry.method.name);
                (mangled, entry.clone())
            })
            .collect()
    }

    fn declare_function(&mut self, func: &Function, symbol_name: &str, is_extension: bool) {
        let mut param_types: Vec<BasicTypeEnum> = Vec::new();
        if let Some(recv) = &func.receiver {
            param_types.push(self.llvm_type(recv));
        }
        param_types.extend(func.params.iter().map(|p| self.llvm_type(&p.ty)));
        let param_meta: Vec<_> = param_types.iter().map(|t| (*t).into()).collect();

        let ret_ty = if is_extension {
            self.llvm_type(&func.return_type)
        } else {
            let err_ty = func.effective_err_type();
            self.llvm_type(&Type::result_of(func.return_type.clone(), err_ty))
        };
        let fn_type = ret_ty.fn_type(&param_meta, false);
        let linkage =
            if func.is_pub || symbol_name == "main" { Linkage::External } else { Linkage::Internal };
        let fn_val = self.module.add_function(symbol_name, fn_type, Some(linkage));
        self.functions.insert(symbol_name.to_string(), fn_val);
    }

    fn emit_functions(&mut self, program: &Program) -> Result<(), CodegenError> {
        for item in &program.items {
            match item {
                Item::Function(f) => self.emit_function(f, &f.name, false)?,
                Item::PerkImpl(p) => {
                    for m in &p.methods {
                        let mangled = format!("{}__{}", mangling::type_name(&p.target_type), m.name);
                        self.emit_function(m, &mangled, true)?;
                    }
                }
                _ => {}
            }
        }
        for (mangled, entry) in &self.extension_entries() {
            self.emit_function(&entry.method, mangled, true)?;
        }
        for f in &self.tables.monomorphized_functions.clone() {
            self.emit_function(f, &f.name, f.receiver.is_some())?;
        }
        Ok(())
    }

    /// The per-function frame: an `entry` block holding every alloca and a
    /// `start` block where real emission begins, with `entry`
    /// unconditionally branching to `start` so mem2reg sees every alloca
    /// up front.
    fn emit_function(
        &mut self,
        func: &Function,
        symbol_name: &str,
        is_extension: bool,
    ) -> Result<(), CodegenError> {
        let fn_val = *self
            .functions
            .get(symbol_name)
            .ok_or_else(|| CodegenError::UndefinedName(symbol_name.to_string()))?;

        let entry_bb = self.context.append_basic_block(fn_val, "entry");
        let start_bb = self.context.append_basic_block(fn_val, "start");
        self.builder.position_at_end(entry_bb);

        self.current_function = Some(fn_val);
        self.current_return_type = Some(func.return_type.clone());
        self.current_err_type = Some(func.effective_err_type());
        self.current_is_extension = is_extension;
        self.scope_stack.clear();
        self.scope_stack.push(HashMap::new());

        let mut llvm_param_idx = 0u32;
        if let Some(recv) = &func.receiver {
            self.alloc_param(fn_val, llvm_param_idx, "self", recv);
            llvm_param_idx += 1;
        }
        for param in &func.params {
            self.alloc_param(fn_val, llvm_param_idx, &param.name, &param.ty);
            llvm_param_idx += 1;
        }

        self.builder.position_at_end(entry_bb);
        self.builder.build_unconditional_branch(start_bb)?;
        self.builder.position_at_end(start_bb);

        let terminated = self.emit_block(&func.body)?;
        if !terminated {
            // Falling off the end of a `Block` body with no explicit
            // `return` — only reachable for functions validated by Pass 2
            // to diverge on every path, so this is a defensive fallback.
            self.emit_scope_cleanup_all();
            let zero = self.llvm_type(&func.return_type).const_zero();
            self.build_return_value(zero, is_extension)?;
        }

        self.scope_stack.pop();
        self.current_function = None;
        Ok(())
    }

    fn alloc_param(&mut self, fn_val: FunctionValue<'ctx>, idx: u32, name: &str, ty: &Type) {
        let llvm_ty = self.llvm_type(ty);
        let alloca = self.builder.build_alloca(llvm_ty, name).expect("entry-block alloca");
        let incoming = fn_val.get_nth_param(idx).expect("declared parameter missing at emission");
        let _ = self.builder.build_store(alloca, incoming);
        self.scope_stack.last_mut().expect("function scope").insert(
            name.to_string(),
            VarSlot { ptr: alloca, ty: ty.clone(), is_param: true, moved: Cell::new(false) },
        );
    }

    /// Wraps `value` in `Result.Ok(value)` before returning, unless this is
    /// an extension/perk method, which yields a bare value.
    pub(crate) fn build_return_value(
        &mut self,
        value: inkwell::values::BasicValueEnum<'ctx>,
        is_extension: bool,
    ) -> Result<(), CodegenError> {
        if is_extension {
            self.builder.build_return(Some(&value))?;
        } else {
            let ok_ty = self.current_return_type.clone().unwrap_or(Type::Blank);
            let err_ty = self.current_err_type.clone().unwrap_or_else(Type::std_error);
            let result = self.build_ok_result(&ok_ty, &err_ty, value)?;
            self.builder.build_return(Some(&result))?;
        }
        Ok(())
    }

    /// `main` must present a C ABI (`int main(int, char**)`); the user's
    /// `main` (if declared) actually returns `Result<i32, _>` like every
    /// other function, so a thin wrapper unwraps it.
    fn emit_main_wrapper(&mut self) -> Result<(), CodegenError> {
        let Some(&user_main) = self.functions.get("main") else {
            return Ok(());
        };
        if user_main.count_params() != 0 {
            return Err(CodegenError::BadEntryPoint("main".to_string()));
        }

        let i32_t = self.context.i32_type();
        let argv_ty = self.i8_ptr().ptr_type(AddressSpace::default());
        let c_main_ty = i32_t.fn_type(&[i32_t.into(), argv_ty.into()], false);
        let c_main = self.module.add_function("main", c_main_ty, Some(Linkage::External));
        // LLVM disallows two globals of the same name; rename the user's
        // Koi-level `main` out of the way first.
        user_main.set_name("koi_main");

        let entry = self.context.append_basic_block(c_main, "entry");
        self.builder.position_at_end(entry);
        let call = self.builder.build_call(user_main, &[], "koi_main_call")?;
        let result = call.try_as_basic_value().left().expect("main returns Result<i32,_>").into_struct_value();
        let result_ty = result.get_type();
        let slot = self.builder.build_alloca(result_ty, "koi_main_result")?;
        self.builder.build_store(slot, result)?;
        let payload_ptr = self.builder.build_struct_gep(result_ty, slot, 1, "result_payload")?;
        // Reads the payload as the exit code regardless of tag; a real
        // runtime-error reporter belongs in the Err arm, not
        // yet wired into this wrapper.
        let exit_code = self
            .builder
            .build_load(i32_t, payload_ptr, "exit_code")?
            .into_int_value();
        self.builder.build_return(Some(&exit_code))?;
        Ok(())
    }
}

/// Scope management and RAII cleanup, shared by the function prologue
/// above and by `statements::emit_block`.
impl<'ctx> CodeGen<'ctx> {
    pub(crate) fn push_scope(&mut self) {
        self.scope_stack.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) -> Result<(), CodegenError> {
        if let Some(scope) = self.scope_stack.pop() {
            self.emit_cleanup_for(&scope)?;
        }
        Ok(())
    }

    /// Cleans up every in-scope variable on every `return`: walks outward
    /// from the innermost scope without popping it, since a `return`
    /// doesn't otherwise leave its enclosing blocks.
    pub(crate) fn emit_scope_cleanup_all(&mut self) {
        let scopes: Vec<_> = self.scope_stack.iter().map(|s| {
            s.iter().map(|(k, v)| (k.clone(), v.ty.clone(), v.moved.get())).collect::<Vec<_>>()
        }).collect();
        for scope in scopes {
            for (_, ty, moved) in scope {
                if !moved {
                    let _ = self.emit_drop(&ty);
                }
            }
        }
    }

    fn emit_cleanup_for(&mut self, scope: &HashMap<String, VarSlot<'ctx>>) -> Result<(), CodegenError> {
        for slot in scope.values() {
            if slot.is_param {
                continue;
            }
            if !slot.moved.get() {
                self.emit_drop_slot(slot)?;
            }
        }
        Ok(())
    }

    /// Frees the resource owned by `slot` if its type is move-only
    /// (dynamic arrays and `Own<T>`); everything else is copied and
    /// needs no cleanup.
    fn emit_drop_slot(&mut self, slot: &VarSlot<'ctx>) -> Result<(), CodegenError> {
        match &slot.ty {
            Type::DynamicArray(_) => self.emit_drop_dynamic_array(slot.ptr)?,
            Type::GenericRef { base_name, .. } if base_name == "Own" => {
                self.emit_drop_own(slot.ptr)?
            }
            Type::Struct { name, .. } if name == "Own" || name.starts_with("Own<") => {
                self.emit_drop_own(slot.ptr)?
            }
            _ => {}
        }
        Ok(())
    }

    /// Best-effort drop used by the fallthrough fallback in
    /// `emit_function`, where no `VarSlot` pointer is on hand — this is a
    /// structural placeholder; real per-variable drops go through
    /// `emit_drop_slot` above.
    fn emit_drop(&mut self, _ty: &Type) -> Result<(), CodegenError> {
        Ok(())
    }

    /// Dynamic array: `free(data)` if non-null, then zero the struct.
    fn emit_drop_dynamic_array(&mut self, ptr: PointerValue<'ctx>) -> Result<(), CodegenError> {
        let array_ty = self.context.struct_type(
            &[self.context.i32_type().into(), self.context.i32_type().into(), self.i8_ptr().into()],
            false,
        );
        let data_ptr_slot = self.builder.build_struct_gep(array_ty, ptr, 2, "arr_data")?;
        let data_ptr = self.builder.build_load(self.i8_ptr(), data_ptr_slot, "arr_data_val")?;
        let free_fn = self.runtime_fns["free"];
        self.builder.build_call(free_fn, &[data_ptr.into()], "free_arr")?;
        let zero = array_ty.const_zero();
        self.builder.build_store(ptr, zero)?;
        Ok(())
    }

    /// `Own<T>`: free the single heap box.
    fn emit_drop_own(&mut self, ptr: PointerValue<'ctx>) -> Result<(), CodegenError> {
        let box_ptr = self.builder.build_load(self.i8_ptr(), ptr, "own_box")?;
        let free_fn = self.runtime_fns["free"];
        self.builder.build_call(free_fn, &[box_ptr.into()], "free_own")?;
        Ok(())
    }

    /// Looks a name up innermost-scope-first; params live in the outermost
    /// (function) scope, so this naturally finds shadowing `let`s first.
    pub(crate) fn lookup_var(&self, name: &str) -> Option<&VarSlot<'ctx>> {
        self.scope_stack.iter().rev().find_map(|scope| scope.get(name))
    }

    pub(crate) fn mark_moved(&self, name: &str) {
        if let Some(slot) = self.lookup_var(name) {
            slot.moved.set(true);
        }
    }

    /// Constructs a `Result<ok_ty, err_ty>.Ok(value)` enum value in a fresh
    /// alloca and loads it back (simplest way to build an aggregate with a
    /// non-zero payload offset without hand-rolling `insertvalue` into an
    /// opaque byte array).
    pub(crate) fn build_ok_result(
        &mut self,
        ok_ty: &Type,
        err_ty: &Type,
        value: inkwell::values::BasicValueEnum<'ctx>,
    ) -> Result<inkwell::values::BasicValueEnum<'ctx>, CodegenError> {
        self.build_result_variant(ok_ty, err_ty, 0, value)
    }

    pub(crate) fn build_err_result(
        &mut self,
        ok_ty: &Type,
        err_ty: &Type,
        value: inkwell::values::BasicValueEnum<'ctx>,
    ) -> Result<inkwell::values::BasicValueEnum<'ctx>, CodegenError> {
        self.build_result_variant(ok_ty, err_ty, 1, value)
    }

    fn build_result_variant(
        &mut self,
        ok_ty: &Type,
        err_ty: &Type,
        tag: u64,
        value: inkwell::values::BasicValueEnum<'ctx>,
    ) -> Result<inkwell::values::BasicValueEnum<'ctx>, CodegenError> {
        let result_ty = self.llvm_type(&Type::result_of(ok_ty.clone(), err_ty.clone())).into_struct_type();
        let slot = self.builder.build_alloca(result_ty, "result_tmp")?;
        let tag_ptr = self.builder.build_struct_gep(result_ty, slot, 0, "result_tag_ptr")?;
        self.builder.build_store(tag_ptr, self.context.i32_type().const_int(tag, false))?;
        // Opaque pointers (llvm21) need no pointer-type cast before the store.
        let payload_ptr = self.builder.build_struct_gep(result_ty, slot, 1, "result_payload_ptr")?;
        self.builder.build_store(payload_ptr, value)?;
        Ok(self.builder.build_load(result_ty, slot, "result_val")?)
    }
}
