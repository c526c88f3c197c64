//! Built-in generic collection providers. `List<T>` needs no provider of
//! its own — it resolves straight to `Type::DynamicArray(T)`, whose
//! physical layout `llvm_type` already knows — so only `HashMap<K,V>`,
//! `Maybe<T>`, `Result<T,E>`, and `Own<T>` dispatch through here, one
//! `emit_*_method` group per base name, plus an open-addressing hash map
//! implementation shared by `HashMap`'s methods and `foreach`.

use super::{CodeGen, CodegenError};
use inkwell::types::{BasicTypeEnum, StructType};
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum, IntValue, PointerValue};
use inkwell::IntPredicate;
use koi_ast::{Arg, Expr, ExprKind, Item, Program, Type};

const TAG_EMPTY: u64 = 0;
const TAG_OCCUPIED: u64 = 1;
const TAG_TOMBSTONE: u64 = 2;
const INITIAL_CAPACITY: u64 = 8;

// `Result`/`Maybe` variant tags: both are declared with their "good" arm
// first (`Ok`/`Some` at index 0, `Err`/`None` at index 1), matching the
// order `register_builtin_result_and_maybe` builds their variant lists in.
const RESULT_OK_TAG: u64 = 0;
const RESULT_ERR_TAG: u64 = 1;
const MAYBE_SOME_TAG: u64 = 0;
const MAYBE_NONE_TAG: u64 = 1;

impl<'ctx> CodeGen<'ctx> {
    /// Scans declared types reachable from function signatures, struct
    /// fields, and enum variants for `HashMap<K,V>` instantiations and
    /// registers each one's layout up front. `HashMap`s that appear only
    /// inside a function body (never in a signature or field) are instead
    /// registered lazily, on first use, by `ensure_hashmap_layout` itself.
    pub(crate) fn register_builtin_generic_layouts(&mut self, program: &Program) {
        let mut pairs: Vec<(Type, Type)> = Vec::new();
        for item in &program.items {
            match item {
                Item::Function(f) => {
                    for p in &f.params {
                        collect_hashmap_pairs(&p.ty, &mut pairs);
                    }
                    collect_hashmap_pairs(&f.return_type, &mut pairs);
                }
                Item::Struct(s) => {
                    for field in &s.fields {
                        collect_hashmap_pairs(&field.ty, &mut pairs);
                    }
                }
                Item::Enum(e) => {
                    for v in &e.variants {
                        for t in &v.associated_types {
                            collect_hashmap_pairs(t, &mut pairs);
                        }
                    }
                }
                Item::Extension(ext) => {
                    for m in &ext.methods {
                        for p in &m.params {
                            collect_hashmap_pairs(&p.ty, &mut pairs);
                        }
                        collect_hashmap_pairs(&m.return_type, &mut pairs);
                    }
                }
                Item::PerkImpl(p) => {
                    for m in &p.methods {
                        for param in &m.params {
                            collect_hashmap_pairs(&param.ty, &mut pairs);
                        }
                        collect_hashmap_pairs(&m.return_type, &mut pairs);
                    }
                }
                _ => {}
            }
        }
        for entry in self.tables.structs.values() {
            for field in &entry.def.fields {
                collect_hashmap_pairs(&field.ty, &mut pairs);
            }
        }
        for f in &self.tables.monomorphized_functions.clone() {
            for p in &f.params {
                collect_hashmap_pairs(&p.ty, &mut pairs);
            }
            collect_hashmap_pairs(&f.return_type, &mut pairs);
        }
        for (k, v) in pairs {
            self.ensure_hashmap_layout(&k, &v);
        }
    }

    /// Lazily builds and caches the LLVM layout for `HashMap<K,V>`: an
    /// entry `{ i32 tag, K key, V value }` (tags Empty=0/Occupied=1/
    /// Tombstone=2) and the map itself as `{ entries: {i32 len, i32 cap,
    /// Entry* data}, count: i32 }`. Idempotent.
    pub(crate) fn ensure_hashmap_layout(&mut self, key_ty: &Type, val_ty: &Type) -> StructType<'ctx> {
        let map_name = crate::mangling::canonical_name("HashMap", &[key_ty.clone(), val_ty.clone()]);
        if let Some(t) = self.struct_types.get(&map_name) {
            return *t;
        }
        let entry_name =
            crate::mangling::canonical_name("HashMapEntry", &[key_ty.clone(), val_ty.clone()]);
        let entry_ty = self.context.opaque_struct_type(&entry_name);
        let key_llvm = self.llvm_type(key_ty);
        let val_llvm = self.llvm_type(val_ty);
        entry_ty.set_body(&[self.context.i32_type().into(), key_llvm, val_llvm], false);
        self.struct_types.insert(entry_name, entry_ty);

        let entry_ptr = self.i8_ptr();
        let entries_struct: BasicTypeEnum = self
            .context
            .struct_type(
                &[self.context.i32_type().into(), self.context.i32_type().into(), entry_ptr.into()],
                false,
            )
            .into();
        let map_ty = self.context.opaque_struct_type(&map_name);
        map_ty.set_body(&[entries_struct, self.context.i32_type().into()], false);
        self.struct_types.insert(map_name, map_ty);
        map_ty
    }

    fn hashmap_entry_type(&mut self, key_ty: &Type, val_ty: &Type) -> StructType<'ctx> {
        let entry_name =
            crate::mangling::canonical_name("HashMapEntry", &[key_ty.clone(), val_ty.clone()]);
        self.struct_types.get(&entry_name).copied().unwrap_or_else(|| {
            self.ensure_hashmap_layout(key_ty, val_ty);
            self.struct_types[&entry_name]
        })
    }

    /// Materializes an already-evaluated value into a fresh alloca so
    /// method dispatch has an addressable pointer regardless of whether
    /// the receiver expression itself denoted storage — method calls work
    /// on temporaries as well as bindings.
    fn materialize(
        &mut self,
        value: BasicValueEnum<'ctx>,
        llvm_ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, CodegenError> {
        let slot = self.builder.build_alloca(llvm_ty, name)?;
        self.builder.build_store(slot, value)?;
        Ok(slot)
    }

    /// Static (non-method) built-in calls reachable through a
    /// `Type.method(...)` callee shape — currently just `Own.alloc(v)`,
    /// the single-owner heap box constructor. Returns `None` for any
    /// other callee shape so `emit_call` falls through to its ordinary
    /// function-lookup path.
    pub(crate) fn try_emit_builtin_static_call(
        &mut self,
        callee: &Expr,
        args: &[Arg],
    ) -> Result<Option<BasicValueEnum<'ctx>>, CodegenError> {
        let ExprKind::FieldAccess { receiver, field } = &callee.kind else {
            return Ok(None);
        };
        let ExprKind::Identifier(type_name) = &receiver.kind else {
            return Ok(None);
        };
        if type_name != "Own" || field != "alloc" {
            return Ok(None);
        }
        let value_expr = args.first().ok_or_else(|| {
            CodegenError::UnknownLayout("Own.alloc expects exactly one argument".to_string())
        })?;
        let value = self.emit_expr(value_expr.value())?;
        let inner_ty = value_expr.value().resolved_type().unwrap_or(Type::I64);
        let llvm_ty = self.llvm_type(&inner_ty);
        let size = self.size_of_type(&inner_ty).max(1);
        let malloc_fn = self.runtime_fns["malloc"];
        let size_val = self.context.i64_type().const_int(size, false);
        let raw = self
            .builder
            .build_call(malloc_fn, &[size_val.into()], "own_alloc")?
            .try_as_basic_value()
            .left()
            .expect("malloc returns a pointer")
            .into_pointer_value();
        self.builder.build_store(raw, value)?;
        let _ = llvm_ty;
        Ok(Some(raw.as_basic_value_enum()))
    }

    /// Built-in method dispatch for `Result<T,E>`, `Maybe<T>`, `Own<T>`,
    /// `List<T>` (i.e. `DynamicArray`), and `HashMap<K,V>`. Returns `None`
    /// for any receiver type without a built-in provider, so
    /// `emit_method_call` falls through to extension-method lookup.
    pub(crate) fn try_emit_builtin_method(
        &mut self,
        receiver: &Expr,
        recv_ty: &Type,
        method: &str,
        args: &[Arg],
    ) -> Result<Option<BasicValueEnum<'ctx>>, CodegenError> {
        match recv_ty {
            Type::Enum { name, generic_args } if name == "Result" => {
                self.emit_result_method(receiver, generic_args, method).map(Some)
            }
            Type::Enum { name, generic_args } if name == "Maybe" => {
                self.emit_maybe_method(receiver, generic_args, method, args).map(Some)
            }
            Type::GenericRef { base_name, type_args } if base_name == "Own" => {
                self.emit_own_method(receiver, type_args, method).map(Some)
            }
            Type::DynamicArray(elem) => {
                self.emit_list_method(receiver, elem, method, args).map(Some)
            }
            Type::Struct { name, .. } if name.starts_with("HashMap<") || name == "HashMap" => {
                self.emit_hashmap_method(receiver, recv_ty, method, args).map(Some)
            }
            Type::GenericRef { base_name, type_args } if base_name == "HashMap" => {
                let (k, v) = (
                    type_args.first().cloned().unwrap_or(Type::I64),
                    type_args.get(1).cloned().unwrap_or(Type::I64),
                );
                self.ensure_hashmap_layout(&k, &v);
                self.emit_hashmap_method(receiver, recv_ty, method, args).map(Some)
            }
            t if method == "hash" && (t.is_integer() || matches!(t, Type::Bool | Type::String)) => {
                self.emit_primitive_hash(receiver, t).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// `.hash() u64` for the primitive keys a synthesized struct/enum hash
    /// bottoms out at: identity (widened) for integers, zero-extend for
    /// `Bool`, and the stored byte length for `String` — the same
    /// not-production-grade-but-deterministic scheme `emit_hash` already
    /// uses for `HashMap` probing.
    fn emit_primitive_hash(
        &mut self,
        receiver: &Expr,
        ty: &Type,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let u64_t = self.context.i64_type();
        match ty {
            t if t.is_integer() => {
                let v = self.emit_expr(receiver)?.into_int_value();
                let widened = if t.is_signed_int() {
                    self.builder.build_int_s_extend_or_bit_cast(v, u64_t, "hash_int")?
                } else {
                    self.builder.build_int_z_extend_or_bit_cast(v, u64_t, "hash_int")?
                };
                Ok(widened.into())
            }
            Type::Bool => {
                let v = self.emit_expr(receiver)?.into_int_value();
                Ok(self.builder.build_int_z_extend(v, u64_t, "hash_bool")?.into())
            }
            Type::String => {
                let v = self.emit_expr(receiver)?;
                let string_ty = self.llvm_type(&Type::String).into_struct_type();
                let slot = self.materialize(v, string_ty.into(), "hash_str_slot")?;
                let len_field = self.builder.build_struct_gep(string_ty, slot, 1, "hash_str_len_field")?;
                let len = self.builder.build_load(self.context.i32_type(), len_field, "hash_str_len")?;
                Ok(self.builder.build_int_z_extend(len.into_int_value(), u64_t, "hash_str_len64")?.into())
            }
            _ => unreachable!("guarded by the caller's match arm"),
        }
    }

    fn emit_result_method(
        &mut self,
        receiver: &Expr,
        generic_args: &[Type],
        method: &str,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let ok_ty = generic_args.first().cloned().unwrap_or(Type::Blank);
        let err_ty = generic_args.get(1).cloned().unwrap_or_else(Type::std_error);
        let enum_ty =
            self.llvm_type(&Type::result_of(ok_ty.clone(), err_ty.clone())).into_struct_type();
        let value = self.emit_expr(receiver)?;
        let slot = self.materialize(value, enum_ty.into(), "result_recv")?;
        let tag_ptr = self.builder.build_struct_gep(enum_ty, slot, 0, "result_tag_ptr")?;
        let tag = self.builder.build_load(self.context.i32_type(), tag_ptr, "result_tag")?.into_int_value();

        match method {
            "is_ok" => Ok(self.eq_u32(tag, RESULT_OK_TAG).as_basic_value_enum()),
            "is_err" => Ok(self.eq_u32(tag, RESULT_ERR_TAG).as_basic_value_enum()),
            "unwrap" => {
                let cond = self.eq_u32(tag, RESULT_OK_TAG);
                self.extract_or_abort(slot, enum_ty, &ok_ty, cond, "unwrap on an Err Result")
            }
            "unwrap_err" => {
                let cond = self.eq_u32(tag, RESULT_ERR_TAG);
                self.extract_or_abort(slot, enum_ty, &err_ty, cond, "unwrap_err on an Ok Result")
            }
            other => Err(CodegenError::UndefinedName(format!("Result.{other}"))),
        }
    }

    fn emit_maybe_method(
        &mut self,
        receiver: &Expr,
        generic_args: &[Type],
        method: &str,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let inner_ty = generic_args.first().cloned().unwrap_or(Type::Blank);
        let enum_ty = self
            .llvm_type(&Type::GenericRef { base_name: "Maybe".to_string(), type_args: vec![inner_ty.clone()] })
            .into_struct_type();
        let value = self.emit_expr(receiver)?;
        let slot = self.materialize(value, enum_ty.into(), "maybe_recv")?;
        let tag_ptr = self.builder.build_struct_gep(enum_ty, slot, 0, "maybe_tag_ptr")?;
        let tag = self.builder.build_load(self.context.i32_type(), tag_ptr, "maybe_tag")?.into_int_value();

        match method {
            "is_some" => Ok(self.eq_u32(tag, MAYBE_SOME_TAG).as_basic_value_enum()),
            "is_none" => Ok(self.eq_u32(tag, MAYBE_NONE_TAG).as_basic_value_enum()),
            "unwrap" => {
                let cond = self.eq_u32(tag, MAYBE_SOME_TAG);
                self.extract_or_abort(slot, enum_ty, &inner_ty, cond, "unwrap on a None Maybe")
            }
            "realise" => {
                let default_expr = args.first().ok_or_else(|| {
                    CodegenError::UnknownLayout("Maybe.realise requires a default argument".to_string())
                })?;
                self.emit_realise(slot, enum_ty, &inner_ty, tag, default_expr.value())
            }
            other => Err(CodegenError::UndefinedName(format!("Maybe.{other}"))),
        }
    }

    /// `.realise(default)`: extract the `Some` payload, or evaluate and
    /// return `default` on `None` — unlike `unwrap`, never aborts.
    fn emit_realise(
        &mut self,
        slot: PointerValue<'ctx>,
        enum_ty: StructType<'ctx>,
        inner_ty: &Type,
        tag: IntValue<'ctx>,
        default_expr: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let cond = self.eq_u32(tag, MAYBE_SOME_TAG);
        let fn_val = self.current_function.expect("inside a function body");
        let some_bb = self.context.append_basic_block(fn_val, "realise_some");
        let none_bb = self.context.append_basic_block(fn_val, "realise_none");
        let merge_bb = self.context.append_basic_block(fn_val, "realise_merge");
        self.builder.build_conditional_branch(cond, some_bb, none_bb)?;

        self.builder.position_at_end(some_bb);
        let payload_ptr = self.builder.build_struct_gep(enum_ty, slot, 1, "realise_payload_ptr")?;
        let llvm_ty = self.llvm_type(inner_ty);
        let some_val = self.builder.build_load(llvm_ty, payload_ptr, "realise_some_val")?;
        self.builder.build_unconditional_branch(merge_bb)?;
        let some_bb = self.builder.get_insert_block().expect("block positioned");

        self.builder.position_at_end(none_bb);
        let none_val = self.emit_expr(default_expr)?;
        self.builder.build_unconditional_branch(merge_bb)?;
        let none_bb = self.builder.get_insert_block().expect("block positioned");

        self.builder.position_at_end(merge_bb);
        let phi = self.builder.build_phi(llvm_ty, "realise_result")?;
        phi.add_incoming(&[(&some_val, some_bb), (&none_val, none_bb)]);
        Ok(phi.as_basic_value())
    }

    pub(crate) fn eq_u32(&self, val: IntValue<'ctx>, expected: u64) -> IntValue<'ctx> {
        let c = self.context.i32_type().const_int(expected, false);
        self.builder.build_int_compare(IntPredicate::EQ, val, c, "tag_eq").expect("int compare")
    }

    /// Loads the payload at field 1 if `cond` holds, otherwise aborts the
    /// process with `message` via the shared runtime-error emitter.
    fn extract_or_abort(
        &mut self,
        slot: PointerValue<'ctx>,
        enum_ty: StructType<'ctx>,
        payload_ty: &Type,
        cond: IntValue<'ctx>,
        message: &str,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let fn_val = self.current_function.expect("inside a function body");
        let ok_bb = self.context.append_basic_block(fn_val, "unwrap_ok");
        let abort_bb = self.context.append_basic_block(fn_val, "unwrap_abort");
        self.builder.build_conditional_branch(cond, ok_bb, abort_bb)?;

        self.builder.position_at_end(abort_bb);
        self.emit_runtime_abort(message)?;

        self.builder.position_at_end(ok_bb);
        let payload_ptr = self.builder.build_struct_gep(enum_ty, slot, 1, "unwrap_payload_ptr")?;
        let llvm_ty = self.llvm_type(payload_ty);
        Ok(self.builder.build_load(llvm_ty, payload_ptr, "unwrap_val")?)
    }

    /// Prints `message` to stderr, matching `emit_bounds_error`'s
    /// report-then-`unreachable` shape.
    pub(crate) fn emit_runtime_abort(&mut self, message: &str) -> Result<(), CodegenError> {
        let msg = self.builder.build_global_string_ptr(&format!("{message}\n"), "abort_msg")?;
        let fprintf = self.runtime_fns["fprintf"];
        let stderr_stream = self.i8_ptr().const_zero();
        self.builder.build_call(
            fprintf,
            &[stderr_stream.into(), msg.as_pointer_value().into()],
            "report_abort",
        )?;
        self.builder.build_unreachable()?;
        Ok(())
    }

    fn emit_own_method(
        &mut self,
        receiver: &Expr,
        type_args: &[Type],
        method: &str,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let inner_ty = type_args.first().cloned().unwrap_or(Type::I64);
        let box_ptr = self.emit_expr(receiver)?.into_pointer_value();
        match method {
            "get" => {
                let llvm_ty = self.llvm_type(&inner_ty);
                Ok(self.builder.build_load(llvm_ty, box_ptr, "own_get")?)
            }
            "destroy" => {
                let free_fn = self.runtime_fns["free"];
                self.builder.build_call(free_fn, &[box_ptr.into()], "own_destroy")?;
                if let ExprKind::Identifier(name) = &receiver.kind {
                    self.mark_moved(name);
                }
                Ok(self.context.struct_type(&[], false).const_zero().into())
            }
            other => Err(CodegenError::UndefinedName(format!("Own.{other}"))),
        }
    }

    /// `List<T>` methods operate directly on the `{i32 len, i32 cap, T*
    /// data}` dynamic-array layout; this is the provider for the base
    /// name `List`, expressed against `Type::DynamicArray` rather than a
    /// separate named struct.
    fn emit_list_method(
        &mut self,
        receiver: &Expr,
        elem: &Type,
        method: &str,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let array_ty = self.llvm_type(&Type::DynamicArray(Box::new(elem.clone()))).into_struct_type();
        let ptr = self.emit_lvalue(receiver).or_else(|_| {
            let v = self.emit_expr(receiver)?;
            self.materialize(v, array_ty.into(), "list_recv")
        })?;
        let i32_t = self.context.i32_type();

        match method {
            "len" => {
                let len_ptr = self.builder.build_struct_gep(array_ty, ptr, 0, "list_len_ptr")?;
                Ok(self.builder.build_load(i32_t, len_ptr, "list_len")?)
            }
            "push" => {
                let value = self.emit_expr(args.first().expect("push takes a value").value())?;
                self.list_push(ptr, array_ty, elem, value)?;
                Ok(self.context.struct_type(&[], false).const_zero().into())
            }
            "pop" => self.list_pop(ptr, array_ty, elem),
            "get" => {
                let idx = self.emit_expr(args.first().expect("get takes an index").value())?.into_int_value();
                self.list_get(ptr, array_ty, elem, idx)
            }
            "set" => {
                let idx = self.emit_expr(args.first().expect("set takes an index").value())?.into_int_value();
                let value = self.emit_expr(args.get(1).expect("set takes a value").value())?;
                self.list_set(ptr, array_ty, elem, idx, value)?;
                Ok(self.context.struct_type(&[], false).const_zero().into())
            }
            other => Err(CodegenError::UndefinedName(format!("List.{other}"))),
        }
    }

    fn list_len_cap_data(
        &mut self,
        ptr: PointerValue<'ctx>,
        array_ty: StructType<'ctx>,
    ) -> Result<(IntValue<'ctx>, IntValue<'ctx>, PointerValue<'ctx>), CodegenError> {
        let i32_t = self.context.i32_type();
        let len_ptr = self.builder.build_struct_gep(array_ty, ptr, 0, "len_ptr")?;
        let cap_ptr = self.builder.build_struct_gep(array_ty, ptr, 1, "cap_ptr")?;
        let data_ptr_slot = self.builder.build_struct_gep(array_ty, ptr, 2, "data_ptr_slot")?;
        let len = self.builder.build_load(i32_t, len_ptr, "len")?.into_int_value();
        let cap = self.builder.build_load(i32_t, cap_ptr, "cap")?.into_int_value();
        let data = self.builder.build_load(self.i8_ptr(), data_ptr_slot, "data")?.into_pointer_value();
        Ok((len, cap, data))
    }

    /// Grows the backing buffer (doubling, 4 elements minimum) when full,
    /// then appends `value` and increments `len`.
    fn list_push(
        &mut self,
        ptr: PointerValue<'ctx>,
        array_ty: StructType<'ctx>,
        elem: &Type,
        value: BasicValueEnum<'ctx>,
    ) -> Result<(), CodegenError> {
        let i32_t = self.context.i32_type();
        let i64_t = self.context.i64_type();
        let elem_llvm = self.llvm_type(elem);
        let elem_size = self.size_of_type(elem).max(1);
        let (len, cap, data) = self.list_len_cap_data(ptr, array_ty)?;

        let fn_val = self.current_function.expect("inside a function body");
        let needs_grow = self.builder.build_int_compare(IntPredicate::UGE, len, cap, "needs_grow")?;
        let grow_bb = self.context.append_basic_block(fn_val, "list_grow");
        let after_grow_bb = self.context.append_basic_block(fn_val, "list_after_grow");
        self.builder.build_conditional_branch(needs_grow, grow_bb, after_grow_bb)?;

        self.builder.position_at_end(grow_bb);
        let doubled = self.builder.build_int_mul(cap, i32_t.const_int(2, false), "doubled_cap")?;
        let zero_cap = self.builder.build_int_compare(IntPredicate::EQ, cap, i32_t.const_zero(), "cap_is_zero")?;
        let min_cap = i32_t.const_int(4, false);
        let new_cap = self.builder.build_select(zero_cap, min_cap, doubled, "new_cap")?.into_int_value();
        let new_cap_64 = self.builder.build_int_z_extend(new_cap, i64_t, "new_cap_64")?;
        let new_bytes = self.builder.build_int_mul(new_cap_64, i64_t.const_int(elem_size, false), "new_bytes")?;
        let realloc_fn = self.runtime_fns["realloc"];
        let new_data = self
            .builder
            .build_call(realloc_fn, &[data.into(), new_bytes.into()], "grow_data")?
            .try_as_basic_value()
            .left()
            .expect("realloc returns a pointer");
        let cap_ptr = self.builder.build_struct_gep(array_ty, ptr, 1, "cap_ptr_store")?;
        self.builder.build_store(cap_ptr, new_cap)?;
        let data_ptr_slot = self.builder.build_struct_gep(array_ty, ptr, 2, "data_ptr_store")?;
        self.builder.build_store(data_ptr_slot, new_data)?;
        self.builder.build_unconditional_branch(after_grow_bb)?;

        self.builder.position_at_end(after_grow_bb);
        let data_ptr_slot = self.builder.build_struct_gep(array_ty, ptr, 2, "data_ptr_reload")?;
        let data_now = self.builder.build_load(self.i8_ptr(), data_ptr_slot, "data_now")?.into_pointer_value();
        let elem_ptr = unsafe { self.builder.build_gep(elem_llvm, data_now, &[len], "push_elem_ptr")? };
        self.builder.build_store(elem_ptr, value)?;
        let new_len = self.builder.build_int_add(len, i32_t.const_int(1, false), "new_len")?;
        let len_ptr = self.builder.build_struct_gep(array_ty, ptr, 0, "len_ptr_store")?;
        self.builder.build_store(len_ptr, new_len)?;
        Ok(())
    }

    /// Pops the last element. Popping an empty list aborts the process —
    /// a `Maybe<T>`-returning `pop` would need the caller's `Maybe<T>`
    /// instantiation already registered, which isn't guaranteed at this
    /// call site, so this simpler contract is the deliberate scope cut.
    fn list_pop(
        &mut self,
        ptr: PointerValue<'ctx>,
        array_ty: StructType<'ctx>,
        elem: &Type,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let i32_t = self.context.i32_type();
        let (len, _cap, data) = self.list_len_cap_data(ptr, array_ty)?;
        let not_empty = self.builder.build_int_compare(IntPredicate::UGT, len, i32_t.const_zero(), "not_empty")?;

        let fn_val = self.current_function.expect("inside a function body");
        let ok_bb = self.context.append_basic_block(fn_val, "pop_ok");
        let abort_bb = self.context.append_basic_block(fn_val, "pop_abort");
        self.builder.build_conditional_branch(not_empty, ok_bb, abort_bb)?;

        self.builder.position_at_end(abort_bb);
        self.emit_runtime_abort("pop on an empty List")?;

        self.builder.position_at_end(ok_bb);
        let new_len = self.builder.build_int_sub(len, i32_t.const_int(1, false), "popped_len")?;
        let len_ptr = self.builder.build_struct_gep(array_ty, ptr, 0, "len_ptr_pop")?;
        self.builder.build_store(len_ptr, new_len)?;
        let elem_llvm = self.llvm_type(elem);
        let elem_ptr = unsafe { self.builder.build_gep(elem_llvm, data, &[new_len], "pop_elem_ptr")? };
        Ok(self.builder.build_load(elem_llvm, elem_ptr, "pop_val")?)
    }

    fn list_get(
        &mut self,
        ptr: PointerValue<'ctx>,
        array_ty: StructType<'ctx>,
        elem: &Type,
        idx: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let (len, _cap, data) = self.list_len_cap_data(ptr, array_ty)?;
        let in_bounds = self.builder.build_int_compare(IntPredicate::ULT, idx, len, "list_get_in_bounds")?;
        let fn_val = self.current_function.expect("inside a function body");
        let ok_bb = self.context.append_basic_block(fn_val, "list_get_ok");
        let abort_bb = self.context.append_basic_block(fn_val, "list_get_abort");
        self.builder.build_conditional_branch(in_bounds, ok_bb, abort_bb)?;

        self.builder.position_at_end(abort_bb);
        self.emit_runtime_abort("List.get index out of bounds")?;

        self.builder.position_at_end(ok_bb);
        let elem_llvm = self.llvm_type(elem);
        let elem_ptr = unsafe { self.builder.build_gep(elem_llvm, data, &[idx], "list_get_ptr")? };
        Ok(self.builder.build_load(elem_llvm, elem_ptr, "list_get_val")?)
    }

    fn list_set(
        &mut self,
        ptr: PointerValue<'ctx>,
        array_ty: StructType<'ctx>,
        elem: &Type,
        idx: IntValue<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> Result<(), CodegenError> {
        let (len, _cap, data) = self.list_len_cap_data(ptr, array_ty)?;
        let in_bounds = self.builder.build_int_compare(IntPredicate::ULT, idx, len, "list_set_in_bounds")?;
        let fn_val = self.current_function.expect("inside a function body");
        let ok_bb = self.context.append_basic_block(fn_val, "list_set_ok");
        let abort_bb = self.context.append_basic_block(fn_val, "list_set_abort");
        self.builder.build_conditional_branch(in_bounds, ok_bb, abort_bb)?;

        self.builder.position_at_end(abort_bb);
        self.emit_runtime_abort("List.set index out of bounds")?;

        self.builder.position_at_end(ok_bb);
        let elem_llvm = self.llvm_type(elem);
        let elem_ptr = unsafe { self.builder.build_gep(elem_llvm, data, &[idx], "list_set_ptr")? };
        self.builder.build_store(elem_ptr, value)?;
        Ok(())
    }

    /// `HashMap<K,V>` methods, open-addressed with linear probing: `get`/
    /// `contains`/`remove` probe until an `Empty` slot or a matching
    /// `Occupied` slot; `set` additionally resizes (doubling) once the
    /// load factor would exceed 0.75.
    fn emit_hashmap_method(
        &mut self,
        receiver: &Expr,
        recv_ty: &Type,
        method: &str,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let (key_ty, val_ty) = match recv_ty {
            Type::Struct { generic_args, .. } => (
                generic_args.first().cloned().unwrap_or(Type::I64),
                generic_args.get(1).cloned().unwrap_or(Type::I64),
            ),
            Type::GenericRef { type_args, .. } => (
                type_args.first().cloned().unwrap_or(Type::I64),
                type_args.get(1).cloned().unwrap_or(Type::I64),
            ),
            _ => (Type::I64, Type::I64),
        };
        let map_ty = self.ensure_hashmap_layout(&key_ty, &val_ty);
        let ptr = self.emit_lvalue(receiver).or_else(|_| {
            let v = self.emit_expr(receiver)?;
            self.materialize(v, map_ty.into(), "map_recv")
        })?;

        match method {
            "len" => {
                let count_ptr = self.builder.build_struct_gep(map_ty, ptr, 1, "map_count_ptr")?;
                Ok(self.builder.build_load(self.context.i32_type(), count_ptr, "map_count")?)
            }
            "set" => {
                let key = self.emit_expr(args.first().expect("set takes a key").value())?;
                let value = self.emit_expr(args.get(1).expect("set takes a value").value())?;
                self.hashmap_set(ptr, map_ty, &key_ty, &val_ty, key, value)?;
                Ok(self.context.struct_type(&[], false).const_zero().into())
            }
            "get" => {
                let key = self.emit_expr(args.first().expect("get takes a key").value())?;
                self.hashmap_get(ptr, map_ty, &key_ty, &val_ty, key)
            }
            "contains" => {
                let key = self.emit_expr(args.first().expect("contains takes a key").value())?;
                self.hashmap_contains(ptr, map_ty, &key_ty, &val_ty, key)
            }
            "remove" => {
                let key = self.emit_expr(args.first().expect("remove takes a key").value())?;
                self.hashmap_remove(ptr, map_ty, &key_ty, &val_ty, key)?;
                Ok(self.context.struct_type(&[], false).const_zero().into())
            }
            other => Err(CodegenError::UndefinedName(format!("HashMap.{other}"))),
        }
    }

    fn hashmap_entries_fields(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
    ) -> Result<(PointerValue<'ctx>, IntValue<'ctx>, IntValue<'ctx>, PointerValue<'ctx>), CodegenError> {
        let entries_ptr = self.builder.build_struct_gep(map_ty, ptr, 0, "entries_ptr")?;
        let entries_struct_ty = self.context.struct_type(
            &[self.context.i32_type().into(), self.context.i32_type().into(), self.i8_ptr().into()],
            false,
        );
        let i32_t = self.context.i32_type();
        let len_ptr = self.builder.build_struct_gep(entries_struct_ty, entries_ptr, 0, "entries_len_ptr")?;
        let cap_ptr = self.builder.build_struct_gep(entries_struct_ty, entries_ptr, 1, "entries_cap_ptr")?;
        let data_ptr_slot =
            self.builder.build_struct_gep(entries_struct_ty, entries_ptr, 2, "entries_data_slot")?;
        let len = self.builder.build_load(i32_t, len_ptr, "entries_len")?.into_int_value();
        let cap = self.builder.build_load(i32_t, cap_ptr, "entries_cap")?.into_int_value();
        let data = self.builder.build_load(self.i8_ptr(), data_ptr_slot, "entries_data")?.into_pointer_value();
        Ok((entries_ptr, len, cap, data))
    }

    /// Equality used by the probe loop: integer/bool/float compare by
    /// value; strings by length then `strcmp`; anything else is treated
    /// as never-equal (documented scope cut — struct/enum keys aren't
    /// supported by this provider).
    fn emit_key_eq(
        &mut self,
        a: BasicValueEnum<'ctx>,
        b: BasicValueEnum<'ctx>,
        ty: &Type,
    ) -> Result<IntValue<'ctx>, CodegenError> {
        match ty {
            t if t.is_integer() || matches!(t, Type::Bool) => Ok(self.builder.build_int_compare(
                IntPredicate::EQ,
                a.into_int_value(),
                b.into_int_value(),
                "key_eq",
            )?),
            t if t.is_float() => Ok(self.builder.build_float_compare(
                inkwell::FloatPredicate::OEQ,
                a.into_float_value(),
                b.into_float_value(),
                "key_feq",
            )?),
            Type::String => {
                let string_ty = self.llvm_type(&Type::String).into_struct_type();
                let a_slot = self.materialize(a, string_ty.into(), "key_eq_a")?;
                let b_slot = self.materialize(b, string_ty.into(), "key_eq_b")?;
                let a_ptr_field = self.builder.build_struct_gep(string_ty, a_slot, 0, "a_ptr_field")?;
                let b_ptr_field = self.builder.build_struct_gep(string_ty, b_slot, 0, "b_ptr_field")?;
                let a_ptr = self.builder.build_load(self.i8_ptr(), a_ptr_field, "a_data_ptr")?;
                let b_ptr = self.builder.build_load(self.i8_ptr(), b_ptr_field, "b_data_ptr")?;
                let strcmp_fn = self.runtime_fns["strcmp"];
                let cmp = self
                    .builder
                    .build_call(strcmp_fn, &[a_ptr.into(), b_ptr.into()], "strcmp_keys")?
                    .try_as_basic_value()
                    .left()
                    .expect("strcmp returns i32")
                    .into_int_value();
                Ok(self.builder.build_int_compare(
                    IntPredicate::EQ,
                    cmp,
                    self.context.i32_type().const_zero(),
                    "str_eq",
                )?)
            }
            _ => Ok(self.context.bool_type().const_int(0, false)),
        }
    }

    /// Probes from `hash(key) mod cap` linearly, stopping at the first
    /// `Empty` slot or the first `Occupied` slot whose key matches.
    /// Returns the final probed slot's entry pointer and whether it was a
    /// match (vs. an `Empty` stop).
    fn hashmap_probe(
        &mut self,
        data: PointerValue<'ctx>,
        cap: IntValue<'ctx>,
        entry_ty: StructType<'ctx>,
        key_ty: &Type,
        key: BasicValueEnum<'ctx>,
    ) -> Result<(PointerValue<'ctx>, IntValue<'ctx>), CodegenError> {
        let i32_t = self.context.i32_type();
        let fn_val = self.current_function.expect("inside a function body");

        let hash = self.emit_hash(key, key_ty)?;
        let start_idx = self.builder.build_int_unsigned_rem(hash, cap, "probe_start")?;
        let idx_alloca = self.builder.build_alloca(i32_t, "probe_idx")?;
        self.builder.build_store(idx_alloca, start_idx)?;

        let loop_bb = self.context.append_basic_block(fn_val, "probe_loop");
        let body_bb = self.context.append_basic_block(fn_val, "probe_body");
        let done_bb = self.context.append_basic_block(fn_val, "probe_done");
        self.builder.build_unconditional_branch(loop_bb)?;

        self.builder.position_at_end(loop_bb);
        self.builder.build_unconditional_branch(body_bb)?;

        self.builder.position_at_end(body_bb);
        let idx = self.builder.build_load(i32_t, idx_alloca, "probe_cur_idx")?.into_int_value();
        let entry_ptr = unsafe { self.builder.build_gep(entry_ty, data, &[idx], "probe_entry_ptr")? };
        let tag_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 0, "probe_tag_ptr")?;
        let tag = self.builder.build_load(i32_t, tag_ptr, "probe_tag")?.into_int_value();
        let is_empty = self.eq_u32(tag, TAG_EMPTY);
        let is_occupied = self.eq_u32(tag, TAG_OCCUPIED);

        let check_key_bb = self.context.append_basic_block(fn_val, "probe_check_key");
        let advance_bb = self.context.append_basic_block(fn_val, "probe_advance");
        self.builder.build_conditional_branch(is_empty, done_bb, check_key_bb)?;

        self.builder.position_at_end(check_key_bb);
        let matches_key_bb = self.context.append_basic_block(fn_val, "probe_matches_key");
        self.builder.build_conditional_branch(is_occupied, matches_key_bb, advance_bb)?;

        self.builder.position_at_end(matches_key_bb);
        let key_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 1, "probe_key_ptr")?;
        let key_llvm_ty = self.llvm_type(key_ty);
        let existing_key = self.builder.build_load(key_llvm_ty, key_ptr, "probe_existing_key")?;
        let key_matches = self.emit_key_eq(existing_key, key, key_ty)?;
        self.builder.build_conditional_branch(key_matches, done_bb, advance_bb)?;

        self.builder.position_at_end(advance_bb);
        let next_idx = self.builder.build_int_add(idx, i32_t.const_int(1, false), "probe_next_idx")?;
        let wrapped_idx = self.builder.build_int_unsigned_rem(next_idx, cap, "probe_wrapped_idx")?;
        self.builder.build_store(idx_alloca, wrapped_idx)?;
        self.builder.build_unconditional_branch(body_bb)?;

        self.builder.position_at_end(done_bb);
        let final_idx = self.builder.build_load(i32_t, idx_alloca, "probe_final_idx")?.into_int_value();
        let final_entry_ptr =
            unsafe { self.builder.build_gep(entry_ty, data, &[final_idx], "probe_final_entry")? };
        let final_tag_ptr =
            self.builder.build_struct_gep(entry_ty, final_entry_ptr, 0, "probe_final_tag_ptr")?;
        let final_tag = self.builder.build_load(i32_t, final_tag_ptr, "probe_final_tag")?.into_int_value();
        let found = self.eq_u32(final_tag, TAG_OCCUPIED);
        Ok((final_entry_ptr, found))
    }

    /// Cheap integer hash: identity for integers, zero-extend for bools,
    /// and the stored byte length for `String` keys (not a production
    /// hash, but deterministic and stable across a single run, which is
    /// all the probe sequence needs).
    fn emit_hash(&mut self, key: BasicValueEnum<'ctx>, ty: &Type) -> Result<IntValue<'ctx>, CodegenError> {
        let i32_t = self.context.i32_type();
        match ty {
            t if t.is_integer() => Ok(self.builder.build_int_cast(key.into_int_value(), i32_t, "hash_int")?),
            Type::Bool => Ok(self.builder.build_int_z_extend(key.into_int_value(), i32_t, "hash_bool")?),
            Type::String => {
                let string_ty = self.llvm_type(&Type::String).into_struct_type();
                let slot = self.materialize(key, string_ty.into(), "hash_str_slot")?;
                let len_field = self.builder.build_struct_gep(string_ty, slot, 1, "hash_str_len_field")?;
                Ok(self.builder.build_load(i32_t, len_field, "hash_str_len")?.into_int_value())
            }
            _ => Ok(i32_t.const_zero()),
        }
    }

    fn hashmap_get(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
        key_ty: &Type,
        val_ty: &Type,
        key: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let entry_ty = self.hashmap_entry_type(key_ty, val_ty);
        let (_, _len, cap, data) = self.hashmap_entries_fields(ptr, map_ty)?;
        let fn_val = self.current_function.expect("inside a function body");
        let empty_map_bb = self.context.append_basic_block(fn_val, "map_get_empty");
        let probe_bb = self.context.append_basic_block(fn_val, "map_get_probe");
        let cap_is_zero = self.builder.build_int_compare(
            IntPredicate::EQ,
            cap,
            self.context.i32_type().const_zero(),
            "cap_zero",
        )?;
        self.builder.build_conditional_branch(cap_is_zero, empty_map_bb, probe_bb)?;

        self.builder.position_at_end(empty_map_bb);
        self.emit_runtime_abort("HashMap.get on a missing key")?;

        self.builder.position_at_end(probe_bb);
        let (entry_ptr, found) = self.hashmap_probe(data, cap, entry_ty, key_ty, key)?;
        let found_bb = self.context.append_basic_block(fn_val, "map_get_found");
        let missing_bb = self.context.append_basic_block(fn_val, "map_get_missing");
        self.builder.build_conditional_branch(found, found_bb, missing_bb)?;

        self.builder.position_at_end(missing_bb);
        self.emit_runtime_abort("HashMap.get on a missing key")?;

        self.builder.position_at_end(found_bb);
        let val_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 2, "map_get_val_ptr")?;
        let val_llvm_ty = self.llvm_type(val_ty);
        Ok(self.builder.build_load(val_llvm_ty, val_ptr, "map_get_val")?)
    }

    fn hashmap_contains(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
        key_ty: &Type,
        val_ty: &Type,
        key: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let entry_ty = self.hashmap_entry_type(key_ty, val_ty);
        let (_, _len, cap, data) = self.hashmap_entries_fields(ptr, map_ty)?;
        let i32_t = self.context.i32_type();
        let cap_is_zero =
            self.builder.build_int_compare(IntPredicate::EQ, cap, i32_t.const_zero(), "contains_cap_zero")?;
        let fn_val = self.current_function.expect("inside a function body");
        let probe_bb = self.context.append_basic_block(fn_val, "map_contains_probe");
        let merge_bb = self.context.append_basic_block(fn_val, "map_contains_merge");
        let result_alloca = self.builder.build_alloca(self.context.bool_type(), "map_contains_result")?;
        self.builder.build_store(result_alloca, self.context.bool_type().const_zero())?;
        self.builder.build_conditional_branch(cap_is_zero, merge_bb, probe_bb)?;

        self.builder.position_at_end(probe_bb);
        let (_entry_ptr, found) = self.hashmap_probe(data, cap, entry_ty, key_ty, key)?;
        self.builder.build_store(result_alloca, found)?;
        self.builder.build_unconditional_branch(merge_bb)?;

        self.builder.position_at_end(merge_bb);
        Ok(self.builder.build_load(self.context.bool_type(), result_alloca, "map_contains_val")?)
    }

    fn hashmap_remove(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
        key_ty: &Type,
        val_ty: &Type,
        key: BasicValueEnum<'ctx>,
    ) -> Result<(), CodegenError> {
        let entry_ty = self.hashmap_entry_type(key_ty, val_ty);
        let (_, _len, cap, data) = self.hashmap_entries_fields(ptr, map_ty)?;
        let i32_t = self.context.i32_type();
        let cap_is_zero =
            self.builder.build_int_compare(IntPredicate::EQ, cap, i32_t.const_zero(), "remove_cap_zero")?;
        let fn_val = self.current_function.expect("inside a function body");
        let probe_bb = self.context.append_basic_block(fn_val, "map_remove_probe");
        let merge_bb = self.context.append_basic_block(fn_val, "map_remove_merge");
        self.builder.build_conditional_branch(cap_is_zero, merge_bb, probe_bb)?;

        self.builder.position_at_end(probe_bb);
        let (entry_ptr, found) = self.hashmap_probe(data, cap, entry_ty, key_ty, key)?;
        let do_remove_bb = self.context.append_basic_block(fn_val, "map_remove_do");
        self.builder.build_conditional_branch(found, do_remove_bb, merge_bb)?;

        self.builder.position_at_end(do_remove_bb);
        let tag_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 0, "remove_tag_ptr")?;
        self.builder.build_store(tag_ptr, i32_t.const_int(TAG_TOMBSTONE, false))?;
        let count_ptr = self.builder.build_struct_gep(map_ty, ptr, 1, "remove_count_ptr")?;
        let count = self.builder.build_load(i32_t, count_ptr, "remove_count")?.into_int_value();
        let new_count = self.builder.build_int_sub(count, i32_t.const_int(1, false), "remove_new_count")?;
        self.builder.build_store(count_ptr, new_count)?;
        self.builder.build_unconditional_branch(merge_bb)?;

        self.builder.position_at_end(merge_bb);
        Ok(())
    }

    /// Resizes to double the current capacity (minimum `INITIAL_CAPACITY`)
    /// once `(count + 1) / cap` would exceed 0.75, re-inserting every
    /// occupied entry into the fresh buffer (tombstones are dropped),
    /// then inserts `key`/`value`.
    fn hashmap_set(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
        key_ty: &Type,
        val_ty: &Type,
        key: BasicValueEnum<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> Result<(), CodegenError> {
        let entry_ty = self.hashmap_entry_type(key_ty, val_ty);
        let i32_t = self.context.i32_type();
        let i64_t = self.context.i64_type();
        let entry_size = self.size_of_type(key_ty).max(1) + self.size_of_type(val_ty).max(1) + 4;

        let (_, _len, cap, _data) = self.hashmap_entries_fields(ptr, map_ty)?;
        let count_ptr = self.builder.build_struct_gep(map_ty, ptr, 1, "set_count_ptr")?;
        let count = self.builder.build_load(i32_t, count_ptr, "set_count")?.into_int_value();

        // Threshold check done in 64-bit arithmetic to avoid overflow:
        // `(count + 1) * 4 > cap * 3` is equivalent to load factor > 0.75.
        let count1 = self.builder.build_int_add(count, i32_t.const_int(1, false), "set_count_plus_1")?;
        let count1_64 = self.builder.build_int_z_extend(count1, i64_t, "set_count1_64")?;
        let cap_64 = self.builder.build_int_z_extend(cap, i64_t, "set_cap_64")?;
        let lhs = self.builder.build_int_mul(count1_64, i64_t.const_int(4, false), "set_lhs")?;
        let rhs = self.builder.build_int_mul(cap_64, i64_t.const_int(3, false), "set_rhs")?;
        let needs_resize = self.builder.build_int_compare(IntPredicate::UGT, lhs, rhs, "set_needs_resize")?;

        let fn_val = self.current_function.expect("inside a function body");
        let resize_bb = self.context.append_basic_block(fn_val, "map_resize");
        let after_resize_bb = self.context.append_basic_block(fn_val, "map_after_resize");
        self.builder.build_conditional_branch(needs_resize, resize_bb, after_resize_bb)?;

        self.builder.position_at_end(resize_bb);
        self.hashmap_resize(ptr, map_ty, entry_ty, key_ty, val_ty, cap, entry_size)?;
        self.builder.build_unconditional_branch(after_resize_bb)?;

        self.builder.position_at_end(after_resize_bb);
        let (_, _len2, cap2, data2) = self.hashmap_entries_fields(ptr, map_ty)?;
        let (entry_ptr, found) = self.hashmap_probe(data2, cap2, entry_ty, key_ty, key)?;
        let tag_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 0, "set_tag_ptr")?;
        self.builder.build_store(tag_ptr, i32_t.const_int(TAG_OCCUPIED, false))?;
        let key_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 1, "set_key_ptr")?;
        self.builder.build_store(key_ptr, key)?;
        let val_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 2, "set_val_ptr")?;
        self.builder.build_store(val_ptr, value)?;

        let was_new_bb = self.context.append_basic_block(fn_val, "map_was_new");
        let set_merge_bb = self.context.append_basic_block(fn_val, "map_set_merge");
        self.builder.build_conditional_branch(found, set_merge_bb, was_new_bb)?;
        self.builder.position_at_end(was_new_bb);
        let count_ptr2 = self.builder.build_struct_gep(map_ty, ptr, 1, "set_count_ptr2")?;
        let count_now = self.builder.build_load(i32_t, count_ptr2, "set_count_now")?.into_int_value();
        let new_count = self.builder.build_int_add(count_now, i32_t.const_int(1, false), "set_new_count")?;
        self.builder.build_store(count_ptr2, new_count)?;
        self.builder.build_unconditional_branch(set_merge_bb)?;
        self.builder.position_at_end(set_merge_bb);
        Ok(())
    }

    fn hashmap_resize(
        &mut self,
        ptr: PointerValue<'ctx>,
        map_ty: StructType<'ctx>,
        entry_ty: StructType<'ctx>,
        key_ty: &Type,
        val_ty: &Type,
        old_cap: IntValue<'ctx>,
        entry_size: u64,
    ) -> Result<(), CodegenError> {
        let i32_t = self.context.i32_type();
        let i64_t = self.context.i64_type();
        let entries_ptr = self.builder.build_struct_gep(map_ty, ptr, 0, "resize_entries_ptr")?;
        let entries_struct_ty =
            self.context.struct_type(&[i32_t.into(), i32_t.into(), self.i8_ptr().into()], false);
        let old_data_slot =
            self.builder.build_struct_gep(entries_struct_ty, entries_ptr, 2, "resize_old_data_slot")?;
        let old_data =
            self.builder.build_load(self.i8_ptr(), old_data_slot, "resize_old_data")?.into_pointer_value();

        let cap_is_zero =
            self.builder.build_int_compare(IntPredicate::EQ, old_cap, i32_t.const_zero(), "resize_cap_zero")?;
        let doubled = self.builder.build_int_mul(old_cap, i32_t.const_int(2, false), "resize_doubled")?;
        let initial = i32_t.const_int(INITIAL_CAPACITY, false);
        let new_cap = self.builder.build_select(cap_is_zero, initial, doubled, "resize_new_cap")?.into_int_value();
        let new_cap_64 = self.builder.build_int_z_extend(new_cap, i64_t, "resize_new_cap_64")?;
        let new_bytes =
            self.builder.build_int_mul(new_cap_64, i64_t.const_int(entry_size, false), "resize_new_bytes")?;
        let malloc_fn = self.runtime_fns["malloc"];
        let new_data = self
            .builder
            .build_call(malloc_fn, &[new_bytes.into()], "resize_new_data")?
            .try_as_basic_value()
            .left()
            .expect("malloc returns a pointer")
            .into_pointer_value();
        let memset_fn = self.runtime_fns["memset"];
        self.builder.build_call(
            memset_fn,
            &[new_data.into(), i32_t.const_zero().into(), new_bytes.into()],
            "resize_zero_new",
        )?;

        // Re-insert every occupied old entry into the fresh buffer.
        let fn_val = self.current_function.expect("inside a function body");
        let idx_alloca = self.builder.build_alloca(i32_t, "resize_idx")?;
        self.builder.build_store(idx_alloca, i32_t.const_zero())?;
        let cond_bb = self.context.append_basic_block(fn_val, "resize_cond");
        let body_bb = self.context.append_basic_block(fn_val, "resize_body");
        let end_bb = self.context.append_basic_block(fn_val, "resize_end");
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(cond_bb);
        let idx = self.builder.build_load(i32_t, idx_alloca, "resize_cur_idx")?.into_int_value();
        let keep_going = self.builder.build_int_compare(IntPredicate::ULT, idx, old_cap, "resize_keep_going")?;
        self.builder.build_conditional_branch(keep_going, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb);
        let old_entry_ptr = unsafe { self.builder.build_gep(entry_ty, old_data, &[idx], "resize_old_entry")? };
        let old_tag_ptr = self.builder.build_struct_gep(entry_ty, old_entry_ptr, 0, "resize_old_tag_ptr")?;
        let old_tag = self.builder.build_load(i32_t, old_tag_ptr, "resize_old_tag")?.into_int_value();
        let is_occupied = self.eq_u32(old_tag, TAG_OCCUPIED);
        let reinsert_bb = self.context.append_basic_block(fn_val, "resize_reinsert");
        let advance_bb = self.context.append_basic_block(fn_val, "resize_advance");
        self.builder.build_conditional_branch(is_occupied, reinsert_bb, advance_bb)?;

        self.builder.position_at_end(reinsert_bb);
        let old_key_ptr = self.builder.build_struct_gep(entry_ty, old_entry_ptr, 1, "resize_old_key_ptr")?;
        let old_val_ptr = self.builder.build_struct_gep(entry_ty, old_entry_ptr, 2, "resize_old_val_ptr")?;
        let key_llvm_ty = self.llvm_type(key_ty);
        let val_llvm_ty = self.llvm_type(val_ty);
        let old_key = self.builder.build_load(key_llvm_ty, old_key_ptr, "resize_old_key")?;
        let old_val = self.builder.build_load(val_llvm_ty, old_val_ptr, "resize_old_val")?;
        let (new_entry_ptr, _found) = self.hashmap_probe(new_data, new_cap, entry_ty, key_ty, old_key)?;
        let new_tag_ptr = self.builder.build_struct_gep(entry_ty, new_entry_ptr, 0, "resize_new_tag_ptr")?;
        self.builder.build_store(new_tag_ptr, i32_t.const_int(TAG_OCCUPIED, false))?;
        let new_key_ptr = self.builder.build_struct_gep(entry_ty, new_entry_ptr, 1, "resize_new_key_ptr")?;
        self.builder.build_store(new_key_ptr, old_key)?;
        let new_val_ptr = self.builder.build_struct_gep(entry_ty, new_entry_ptr, 2, "resize_new_val_ptr")?;
        self.builder.build_store(new_val_ptr, old_val)?;
        self.builder.build_unconditional_branch(advance_bb)?;

        self.builder.position_at_end(advance_bb);
        let next_idx = self.builder.build_int_add(idx, i32_t.const_int(1, false), "resize_next_idx")?;
        self.builder.build_store(idx_alloca, next_idx)?;
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(end_bb);
        let free_fn = self.runtime_fns["free"];
        self.builder.build_call(free_fn, &[old_data.into()], "resize_free_old")?;

        let entries_ptr2 = self.builder.build_struct_gep(map_ty, ptr, 0, "resize_entries_ptr2")?;
        let cap_ptr = self.builder.build_struct_gep(entries_struct_ty, entries_ptr2, 1, "resize_cap_ptr")?;
        self.builder.build_store(cap_ptr, new_cap)?;
        let data_ptr_slot =
            self.builder.build_struct_gep(entries_struct_ty, entries_ptr2, 2, "resize_data_slot")?;
        self.builder.build_store(data_ptr_slot, new_data)?;
        Ok(())
    }

    /// `foreach k in map {...}` binds `k` to each occupied entry's key,
    /// skipping `Empty`/`Tombstone` slots — the simple key-iteration
    /// variant rather than full `keys`/`values`/`entries` dispatch
    /// (documented scope cut in DESIGN.md).
    pub(crate) fn emit_foreach_hashmap(
        &mut self,
        var_name: &str,
        iterable: &Expr,
        body: &koi_ast::Block,
    ) -> Result<bool, CodegenError> {
        let map_recv_ty = iterable.resolved_type().unwrap_or(Type::Blank);
        let (key_ty, val_ty) = match &map_recv_ty {
            Type::Struct { generic_args, .. } | Type::Enum { generic_args, .. } => (
                generic_args.first().cloned().unwrap_or(Type::I64),
                generic_args.get(1).cloned().unwrap_or(Type::I64),
            ),
            Type::GenericRef { type_args, .. } => (
                type_args.first().cloned().unwrap_or(Type::I64),
                type_args.get(1).cloned().unwrap_or(Type::I64),
            ),
            _ => (Type::I64, Type::I64),
        };
        let map_ty = self.ensure_hashmap_layout(&key_ty, &val_ty);
        let entry_ty = self.hashmap_entry_type(&key_ty, &val_ty);
        let ptr = self.emit_lvalue(iterable).or_else(|_| {
            let v = self.emit_expr(iterable)?;
            self.materialize(v, map_ty.into(), "foreach_map_recv")
        })?;
        let (_, _len, cap, data) = self.hashmap_entries_fields(ptr, map_ty)?;

        let i32_t = self.context.i32_type();
        let idx_alloca = self.builder.build_alloca(i32_t, "map_foreach_idx")?;
        self.builder.build_store(idx_alloca, i32_t.const_zero())?;
        let fn_val = self.current_function.expect("inside a function body");
        let cond_bb = self.context.append_basic_block(fn_val, "map_foreach_cond");
        let check_tag_bb = self.context.append_basic_block(fn_val, "map_foreach_check_tag");
        let body_bb = self.context.append_basic_block(fn_val, "map_foreach_body");
        let advance_bb = self.context.append_basic_block(fn_val, "map_foreach_advance");
        let end_bb = self.context.append_basic_block(fn_val, "map_foreach_end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let idx = self.builder.build_load(i32_t, idx_alloca, "map_foreach_cur_idx")?.into_int_value();
        let keep_going = self.builder.build_int_compare(IntPredicate::ULT, idx, cap, "map_foreach_keep_going")?;
        self.builder.build_conditional_branch(keep_going, check_tag_bb, end_bb)?;

        self.builder.position_at_end(check_tag_bb);
        let entry_ptr = unsafe { self.builder.build_gep(entry_ty, data, &[idx], "map_foreach_entry")? };
        let tag_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 0, "map_foreach_tag_ptr")?;
        let tag = self.builder.build_load(i32_t, tag_ptr, "map_foreach_tag")?.into_int_value();
        let is_occupied = self.eq_u32(tag, TAG_OCCUPIED);
        self.builder.build_conditional_branch(is_occupied, body_bb, advance_bb)?;

        self.loop_stack.push(super::LoopTargets { cond_bb: advance_bb, end_bb });
        self.builder.position_at_end(body_bb);
        self.push_scope();
        let key_ptr = self.builder.build_struct_gep(entry_ty, entry_ptr, 1, "map_foreach_key_ptr")?;
        let key_llvm_ty = self.llvm_type(&key_ty);
        let key_val = self.builder.build_load(key_llvm_ty, key_ptr, "map_foreach_key")?;
        let key_alloca = self.builder.build_alloca(key_llvm_ty, var_name)?;
        self.builder.build_store(key_alloca, key_val)?;
        self.scope_stack.last_mut().expect("foreach scope").insert(
            var_name.to_string(),
            super::VarSlot { ptr: key_alloca, ty: key_ty.clone(), is_param: false, moved: std::cell::Cell::new(false) },
        );
        let terminated = self.emit_block(body)?;
        self.pop_scope()?;
        if !terminated {
            self.builder.build_unconditional_branch(advance_bb)?;
        }
        self.loop_stack.pop();

        self.builder.position_at_end(advance_bb);
        let next_idx = self.builder.build_int_add(idx, i32_t.const_int(1, false), "map_foreach_next_idx")?;
        self.builder.build_store(idx_alloca, next_idx)?;
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(end_bb);
        Ok(false)
    }

    /// Converts `value` to a `String` for f-string interpolation: a
    /// `String` passes through, a `Bool` selects between two literal
    /// strings, and numeric types format through `sprintf` into a heap
    /// buffer.
    pub(crate) fn builtin_to_string(
        &mut self,
        ty: &Type,
        value: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        match ty {
            Type::String => Ok(value),
            Type::Bool => {
                let true_str = self.emit_string_literal("true")?;
                let false_str = self.emit_string_literal("false")?;
                Ok(self.builder.build_select(value.into_int_value(), true_str, false_str, "bool_to_string")?)
            }
            t if t.is_float() => self.format_numeric_to_string(value, "%g"),
            t if t.is_integer() => self.format_numeric_to_string(value, "%lld"),
            _ => Ok(value),
        }
    }

    fn format_numeric_to_string(
        &mut self,
        value: BasicValueEnum<'ctx>,
        fmt: &str,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let i64_t = self.context.i64_type();
        let widened: BasicMetadataValueEnum<'ctx> = if value.is_int_value() {
            let iv = value.into_int_value();
            self.builder.build_int_s_extend_or_bit_cast(iv, i64_t, "to_string_widen")?.into()
        } else {
            self.builder
                .build_float_cast(value.into_float_value(), self.context.f64_type(), "to_string_fwiden")?
                .into()
        };

        const BUF_SIZE: u64 = 32;
        let buf_size = self.context.i64_type().const_int(BUF_SIZE, false);
        let malloc_fn = self.runtime_fns["malloc"];
        let buf = self
            .builder
            .build_call(malloc_fn, &[buf_size.into()], "to_string_buf")?
            .try_as_basic_value()
            .left()
            .expect("malloc returns a pointer")
            .into_pointer_value();

        let fmt_ptr = self.builder.build_global_string_ptr(fmt, "to_string_fmt")?;
        let sprintf_fn = self.get_or_declare_sprintf();
        self.builder.build_call(
            sprintf_fn,
            &[buf.into(), fmt_ptr.as_pointer_value().into(), widened],
            "to_string_sprintf",
        )?;

        let strlen_fn = self.runtime_fns["strlen"];
        let len64 = self
            .builder
            .build_call(strlen_fn, &[buf.into()], "to_string_len")?
            .try_as_basic_value()
            .left()
            .expect("strlen returns an integer")
            .into_int_value();
        let len32 = self.builder.build_int_cast(len64, self.context.i32_type(), "to_string_len32")?;

        let string_ty = self.llvm_type(&Type::String).into_struct_type();
        let slot = self.builder.build_alloca(string_ty, "to_string_val")?;
        let ptr_field = self.builder.build_struct_gep(string_ty, slot, 0, "to_string_ptr_field")?;
        self.builder.build_store(ptr_field, buf)?;
        let len_field = self.builder.build_struct_gep(string_ty, slot, 1, "to_string_len_field")?;
        self.builder.build_store(len_field, len32)?;
        Ok(self.builder.build_load(string_ty, slot, "to_string_loaded")?)
    }

    fn get_or_declare_sprintf(&mut self) -> inkwell::values::FunctionValue<'ctx> {
        if let Some(f) = self.runtime_fns.get("sprintf") {
            return *f;
        }
        let i32_t = self.context.i32_type();
        let i8_ptr = self.i8_ptr();
        let fn_type = i32_t.fn_type(&[i8_ptr.into(), i8_ptr.into()], true);
        let f = self.module.add_function("sprintf", fn_type, Some(inkwell::module::Linkage::External));
        self.runtime_fns.insert("sprintf", f);
        f
    }

    /// Concatenates two `String` fat pointers by copying both byte ranges
    /// into a fresh `malloc`'d, NUL-terminated buffer.
    pub(crate) fn builtin_string_concat(
        &mut self,
        a: BasicValueEnum<'ctx>,
        b: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let string_ty = self.llvm_type(&Type::String).into_struct_type();
        let i32_t = self.context.i32_type();
        let i64_t = self.context.i64_type();

        let a_slot = self.materialize(a, string_ty.into(), "concat_a")?;
        let b_slot = self.materialize(b, string_ty.into(), "concat_b")?;
        let a_ptr_field = self.builder.build_struct_gep(string_ty, a_slot, 0, "concat_a_ptr_field")?;
        let a_len_field = self.builder.build_struct_gep(string_ty, a_slot, 1, "concat_a_len_field")?;
        let b_ptr_field = self.builder.build_struct_gep(string_ty, b_slot, 0, "concat_b_ptr_field")?;
        let b_len_field = self.builder.build_struct_gep(string_ty, b_slot, 1, "concat_b_len_field")?;
        let a_ptr = self.builder.build_load(self.i8_ptr(), a_ptr_field, "concat_a_ptr")?.into_pointer_value();
        let a_len = self.builder.build_load(i32_t, a_len_field, "concat_a_len")?.into_int_value();
        let b_ptr = self.builder.build_load(self.i8_ptr(), b_ptr_field, "concat_b_ptr")?.into_pointer_value();
        let b_len = self.builder.build_load(i32_t, b_len_field, "concat_b_len")?.into_int_value();

        let total_len = self.builder.build_int_add(a_len, b_len, "concat_total_len")?;
        let total_len_64 = self.builder.build_int_z_extend(total_len, i64_t, "concat_total_len_64")?;
        let alloc_len = self.builder.build_int_add(total_len_64, i64_t.const_int(1, false), "concat_alloc_len")?;
        let malloc_fn = self.runtime_fns["malloc"];
        let new_buf = self
            .builder
            .build_call(malloc_fn, &[alloc_len.into()], "concat_buf")?
            .try_as_basic_value()
            .left()
            .expect("malloc returns a pointer")
            .into_pointer_value();

        let memcpy_fn = self.runtime_fns["memcpy"];
        let a_len_64 = self.builder.build_int_z_extend(a_len, i64_t, "concat_a_len_64")?;
        self.builder.build_call(memcpy_fn, &[new_buf.into(), a_ptr.into(), a_len_64.into()], "concat_copy_a")?;
        let b_dest = unsafe { self.builder.build_gep(self.context.i8_type(), new_buf, &[a_len], "concat_b_dest")? };
        let b_len_64 = self.builder.build_int_z_extend(b_len, i64_t, "concat_b_len_64")?;
        self.builder.build_call(memcpy_fn, &[b_dest.into(), b_ptr.into(), b_len_64.into()], "concat_copy_b")?;
        let nul_dest =
            unsafe { self.builder.build_gep(self.context.i8_type(), new_buf, &[total_len], "concat_nul_dest")? };
        self.builder.build_store(nul_dest, self.context.i8_type().const_zero())?;

        let slot = self.builder.build_alloca(string_ty, "concat_result")?;
        let ptr_field = self.builder.build_struct_gep(string_ty, slot, 0, "concat_result_ptr_field")?;
        self.builder.build_store(ptr_field, new_buf)?;
        let len_field = self.builder.build_struct_gep(string_ty, slot, 1, "concat_result_len_field")?;
        self.builder.build_store(len_field, total_len)?;
        Ok(self.builder.build_load(string_ty, slot, "concat_result_loaded")?)
    }
}

fn collect_hashmap_pairs(ty: &Type, out: &mut Vec<(Type, Type)>) {
    match ty {
        Type::GenericRef { base_name, type_args } if base_name == "HashMap" && type_args.len() == 2 => {
            out.push((type_args[0].clone(), type_args[1].clone()));
        }
        Type::Struct { name, generic_args } if name == "HashMap" && generic_args.len() == 2 => {
            out.push((generic_args[0].clone(), generic_args[1].clone()));
        }
        Type::Array(inner, _) | Type::DynamicArray(inner) | Type::Pointer(inner) | Type::Iterator(inner) => {
            collect_hashmap_pairs(inner, out)
        }
        Type::Reference { referenced, .. } => collect_hashmap_pairs(referenced, out),
        Type::Result { ok, err } => {
            collect_hashmap_pairs(ok, out);
            collect_hashmap_pairs(err, out);
        }
        Type::GenericRef { type_args, .. } => {
            for t in type_args {
                collect_hashmap_pairs(t, out);
            }
        }
        Type::Struct { generic_args, .. } | Type::Enum { generic_args, .. } => {
            for t in generic_args {
                collect_hashmap_pairs(t, out);
            }
        }
        _ => {}
    }
}
