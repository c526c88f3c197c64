//! Statement emission.

use super::{CodeGen, CodegenError, LoopTargets, VarSlot};
use inkwell::basic_block::BasicBlock;
use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;
use koi_ast::{Block, Expr, ExprKind, MatchArm, Pattern, Statement, Type};
use std::cell::Cell;

impl<'ctx> CodeGen<'ctx> {
    /// Emits every statement in `block`. Returns `true` if the block
    /// definitely terminated its basic block (`return`/`break`/`continue`
    /// or an exhaustively-terminating `if`), so callers know not to emit a
    /// fallthrough branch afterward.
    pub(crate) fn emit_block(&mut self, block: &Block) -> Result<bool, CodegenError> {
        for stmt in block {
            if self.emit_statement(stmt)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn emit_statement(&mut self, stmt: &Statement) -> Result<bool, CodegenError> {
        match stmt {
            Statement::Let { name, ty, value } => {
                self.emit_let(name, ty.as_ref(), value)?;
                Ok(false)
            }
            Statement::Rebind { target, value } => {
                self.emit_rebind(target, value)?;
                Ok(false)
            }
            Statement::Return(expr) => {
                self.emit_return(expr)?;
                Ok(true)
            }
            Statement::Expr(expr) => {
                self.emit_expr(expr)?;
                Ok(false)
            }
            Statement::If { cond, then_block, elif_branches, else_block } => {
                self.emit_if(cond, then_block, elif_branches, else_block.as_ref())
            }
            Statement::While { cond, body } => self.emit_while(cond, body),
            Statement::Foreach { var_name, item_type, iterable, body } => {
                self.emit_foreach(var_name, item_type.as_ref(), iterable, body)
            }
            Statement::Match { scrutinee, arms } => self.emit_match(scrutinee, arms),
            Statement::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| CodegenError::UnknownLayout("`break` outside a loop".to_string()))?;
                self.builder.build_unconditional_branch(target.end_bb)?;
                Ok(true)
            }
            Statement::Continue => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| CodegenError::UnknownLayout("`continue` outside a loop".to_string()))?;
                self.builder.build_unconditional_branch(target.cond_bb)?;
                Ok(true)
            }
        }
    }

    /// `let` creates the alloca, evaluates the RHS, and stores it. This
    /// implementation tracks every binding uniformly through `VarSlot`, so
    /// no special declaration path is needed for move-only types.
    fn emit_let(&mut self, name: &str, declared_ty: Option<&Type>, value: &Expr) -> Result<(), CodegenError> {
        let ty = declared_ty.cloned().or_else(|| value.resolved_type()).unwrap_or(Type::I32);
        let val = self.emit_expr(value)?;
        let llvm_ty = self.llvm_type(&ty);
        let alloca = self.builder.build_alloca(llvm_ty, name)?;
        self.builder.build_store(alloca, val)?;

        // A `let` from another dynamic-array variable is a move: the
        // source is nullified and skipped at its own scope's cleanup.
        if let ExprKind::Identifier(src_name) = &value.kind {
            if matches!(ty, Type::DynamicArray(_)) {
                self.mark_moved(src_name);
            }
        }

        self.scope_stack.last_mut().expect("at least the function scope").insert(
            name.to_string(),
            VarSlot { ptr: alloca, ty, is_param: false, moved: Cell::new(false) },
        );
        Ok(())
    }

    /// `rebind` for a normal variable stores directly; for a dynamic
    /// array, frees the old buffer first and, if the RHS is itself a
    /// variable, moves it (nullify + mark source moved); for a field
    /// rebind, GEPs to the field and stores through it.
    fn emit_rebind(&mut self, target: &Expr, value: &Expr) -> Result<(), CodegenError> {
        let val = self.emit_expr(value)?;
        let target_ty = target.resolved_type().unwrap_or(Type::I32);

        if matches!(target_ty, Type::DynamicArray(_)) {
            if let ExprKind::Identifier(name) = &target.kind {
                if let Some(slot) = self.lookup_var(name) {
                    let ptr = slot.ptr;
                    self.emit_drop_dynamic_array(ptr)?;
                }
            }
            if let ExprKind::Identifier(src_name) = &value.kind {
                self.mark_moved(src_name);
            }
        }

        let target_ptr = self.emit_lvalue(target)?;
        self.builder.build_store(target_ptr, val)?;
        if let ExprKind::Identifier(name) = &target.kind {
            if let Some(slot) = self.lookup_var(name) {
                slot.moved.set(false);
            }
        }
        Ok(())
    }

    /// `return` marks the returned binding as moved (so RAII skips it),
    /// evaluates the value, cleans up the current frame's scopes, then
    /// returns — wrapped in `Result.Ok` unless this is an
    /// extension/perk-impl method.
    fn emit_return(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        if let ExprKind::Identifier(name) = &expr.kind {
            self.mark_moved(name);
        }
        let val = self.emit_expr(expr)?;
        self.emit_scope_cleanup_all();
        let is_extension = self.current_is_extension;
        self.build_return_value(val, is_extension)
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        elif_branches: &[(Expr, Block)],
        else_block: Option<&Block>,
    ) -> Result<bool, CodegenError> {
        let fn_val = self.current_function.expect("inside a function body");
        let merge_bb = self.context.append_basic_block(fn_val, "if_merge");

        let mut all_terminated = true;
        let cond_val = self.emit_condition(cond)?;
        let then_bb = self.context.append_basic_block(fn_val, "if_then");
        let next_bb = self.context.append_basic_block(fn_val, "if_next");
        self.builder.build_conditional_branch(cond_val, then_bb, next_bb)?;

        self.builder.position_at_end(then_bb);
        self.push_scope();
        let then_terminated = self.emit_block(then_block)?;
        self.pop_scope()?;
        if !then_terminated {
            self.builder.build_unconditional_branch(merge_bb)?;
            all_terminated = false;
        }

        self.builder.position_at_end(next_bb);
        for (elif_cond, elif_body) in elif_branches {
            let elif_cond_val = self.emit_condition(elif_cond)?;
            let elif_then_bb = self.context.append_basic_block(fn_val, "elif_then");
            let elif_next_bb = self.context.append_basic_block(fn_val, "elif_next");
            self.builder.build_conditional_branch(elif_cond_val, elif_then_bb, elif_next_bb)?;

            self.builder.position_at_end(elif_then_bb);
            self.push_scope();
            let elif_terminated = self.emit_block(elif_body)?;
            self.pop_scope()?;
            if !elif_terminated {
                self.builder.build_unconditional_branch(merge_bb)?;
                all_terminated = false;
            }
            self.builder.position_at_end(elif_next_bb);
        }

        match else_block {
            Some(body) => {
                self.push_scope();
                let else_terminated = self.emit_block(body)?;
                self.pop_scope()?;
                if !else_terminated {
                    self.builder.build_unconditional_branch(merge_bb)?;
                    all_terminated = false;
                }
            }
            None => {
                self.builder.build_unconditional_branch(merge_bb)?;
                all_terminated = false;
            }
        }

        self.builder.position_at_end(merge_bb);
        if all_terminated {
            self.builder.build_unreachable()?;
        }
        Ok(all_terminated)
    }

    fn emit_while(&mut self, cond: &Expr, body: &Block) -> Result<bool, CodegenError> {
        let fn_val = self.current_function.expect("inside a function body");
        let cond_bb = self.context.append_basic_block(fn_val, "while_cond");
        let body_bb = self.context.append_basic_block(fn_val, "while_body");
        let end_bb = self.context.append_basic_block(fn_val, "while_end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let cond_val = self.emit_condition(cond)?;
        self.builder.build_conditional_branch(cond_val, body_bb, end_bb)?;

        self.loop_stack.push(LoopTargets { cond_bb, end_bb });
        self.builder.position_at_end(body_bb);
        self.push_scope();
        let terminated = self.emit_block(body)?;
        self.pop_scope()?;
        if !terminated {
            self.builder.build_unconditional_branch(cond_bb)?;
        }
        self.loop_stack.pop();

        self.builder.position_at_end(end_bb);
        Ok(false)
    }

    /// `foreach`: builds an index-based loop over the iterable. Fixed
    /// arrays and dynamic arrays advance by incrementing an index against
    /// the length field; `HashMap` iteration is delegated to the
    /// `builtins` provider, which knows how to skip tombstones.
    fn emit_foreach(
        &mut self,
        var_name: &str,
        item_type: Option<&Type>,
        iterable: &Expr,
        body: &Block,
    ) -> Result<bool, CodegenError> {
        let iterable_ty = iterable.resolved_type().unwrap_or(Type::Blank);
        if is_hashmap_type(&iterable_ty) {
            return self.emit_foreach_hashmap(var_name, iterable, body);
        }

        let fn_val = self.current_function.expect("inside a function body");
        let i32_t = self.context.i32_type();
        let idx_alloca = self.builder.build_alloca(i32_t, "foreach_idx")?;
        self.builder.build_store(idx_alloca, i32_t.const_zero())?;

        let len_val = self.emit_len(iterable, &iterable_ty)?;
        let cond_bb = self.context.append_basic_block(fn_val, "foreach_cond");
        let body_bb = self.context.append_basic_block(fn_val, "foreach_body");
        let end_bb = self.context.append_basic_block(fn_val, "foreach_end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let idx_val = self.builder.build_load(i32_t, idx_alloca, "foreach_idx_val")?.into_int_value();
        let keep_going = self.builder.build_int_compare(IntPredicate::ULT, idx_val, len_val, "foreach_keep_going")?;
        self.builder.build_conditional_branch(keep_going, body_bb, end_bb)?;

        self.loop_stack.push(LoopTargets { cond_bb, end_bb });
        self.builder.position_at_end(body_bb);
        self.push_scope();

        let elem_ty = item_type.cloned().unwrap_or(Type::I32);
        let item_val = self.emit_elem_at(iterable, &iterable_ty, idx_val)?;
        let item_alloca = self.builder.build_alloca(self.llvm_type(&elem_ty), var_name)?;
        self.builder.build_store(item_alloca, item_val)?;
        self.scope_stack.last_mut().expect("foreach scope").insert(
            var_name.to_string(),
            VarSlot { ptr: item_alloca, ty: elem_ty, is_param: false, moved: Cell::new(false) },
        );

        let terminated = self.emit_block(body)?;
        self.pop_scope()?;
        if !terminated {
            let next_idx = self.builder.build_int_add(idx_val, i32_t.const_int(1, false), "foreach_next_idx")?;
            self.builder.build_store(idx_alloca, next_idx)?;
            self.builder.build_unconditional_branch(cond_bb)?;
        }
        self.loop_stack.pop();

        self.builder.position_at_end(end_bb);
        Ok(false)
    }

    fn emit_len(
        &mut self,
        iterable: &Expr,
        ty: &Type,
    ) -> Result<inkwell::values::IntValue<'ctx>, CodegenError> {
        match ty {
            Type::Array(_, len) => Ok(self.context.i32_type().const_int(*len as u64, false)),
            Type::DynamicArray(elem) => {
                let ptr = self.emit_lvalue(iterable)?;
                let struct_ty = self.llvm_type(&Type::DynamicArray(elem.clone())).into_struct_type();
                let len_ptr = self.builder.build_struct_gep(struct_ty, ptr, 0, "len_ptr")?;
                Ok(self
                    .builder
                    .build_load(self.context.i32_type(), len_ptr, "len_val")?
                    .into_int_value())
            }
            _ => Err(CodegenError::UnknownLayout(format!("foreach over {ty:?}"))),
        }
    }

    fn emit_elem_at(
        &mut self,
        iterable: &Expr,
        ty: &Type,
        idx: inkwell::values::IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        match ty {
            Type::Array(elem, len) => {
                let ptr = self.emit_lvalue(iterable)?;
                let array_ty = self.llvm_type(&Type::Array(elem.clone(), *len)).into_array_type();
                let i32_t = self.context.i32_type();
                let elem_ptr = unsafe {
                    self.builder.build_gep(array_ty, ptr, &[i32_t.const_zero(), idx], "foreach_elem_ptr")?
                };
                Ok(self.builder.build_load(self.llvm_type(elem), elem_ptr, "foreach_elem")?)
            }
            Type::DynamicArray(elem) => {
                let ptr = self.emit_lvalue(iterable)?;
                let struct_ty = self.llvm_type(&Type::DynamicArray(elem.clone())).into_struct_type();
                let data_ptr_slot = self.builder.build_struct_gep(struct_ty, ptr, 2, "data_ptr_slot")?;
                let data_ptr = self
                    .builder
                    .build_load(self.i8_ptr(), data_ptr_slot, "data_ptr")?
                    .into_pointer_value();
                let elem_llvm_ty = self.llvm_type(elem);
                let elem_ptr = unsafe { self.builder.build_gep(elem_llvm_ty, data_ptr, &[idx], "dyn_elem_ptr")? };
                Ok(self.builder.build_load(elem_llvm_ty, elem_ptr, "foreach_elem")?)
            }
            _ => Err(CodegenError::UnknownLayout(format!("foreach over {ty:?}"))),
        }
    }

    /// `match`: switch on the scrutinee's tag. A wildcard arm supplies the
    /// default; lacking one, the default block is unreachable. Duplicate
    /// outer tags only enter the switch table once — later arms on the
    /// same tag are runtime fallthrough checks chained inside the first
    /// arm for that tag.
    fn emit_match(&mut self, scrutinee: &Expr, arms: &[MatchArm]) -> Result<bool, CodegenError> {
        let scrutinee_ty = scrutinee.resolved_type().unwrap_or(Type::Blank);
        let enum_ty = self.llvm_type(&scrutinee_ty).into_struct_type();
        let scrutinee_val = self.emit_expr(scrutinee)?.into_struct_value();
        let slot = self.builder.build_alloca(enum_ty, "match_scrutinee")?;
        self.builder.build_store(slot, scrutinee_val)?;
        let tag_ptr = self.builder.build_struct_gep(enum_ty, slot, 0, "match_tag_ptr")?;
        let tag = self.builder.build_load(self.context.i32_type(), tag_ptr, "match_tag")?.into_int_value();

        let fn_val = self.current_function.expect("inside a function body");
        let merge_bb = self.context.append_basic_block(fn_val, "match_merge");
        let default_bb = self.context.append_basic_block(fn_val, "match_default");

        // Group arms by tag so duplicate-tag arms chain as fallthrough
        // checks rather than producing duplicate switch cases.
        let mut by_tag: Vec<(u64, Vec<&MatchArm>)> = Vec::new();
        let mut wildcard_arm: Option<&MatchArm> = None;
        for arm in arms {
            match &arm.pattern {
                Pattern::Wildcard => wildcard_arm = Some(arm),
                Pattern::EnumVariant { enum_name, variant, .. } => {
                    let target_enum = enum_name.clone().unwrap_or_else(|| scrutinee_ty_name(&scrutinee_ty));
                    let tag_id = self.variant_tag(&target_enum, variant)?;
                    if let Some((_, group)) = by_tag.iter_mut().find(|(t, _)| *t == tag_id) {
                        group.push(arm);
                    } else {
                        by_tag.push((tag_id, vec![arm]));
                    }
                }
                Pattern::Binding(_) | Pattern::Own(_) => {
                    return Err(CodegenError::UnknownLayout(
                        "top-level match pattern must be a variant, wildcard, or binding".to_string(),
                    ))
                }
            }
        }

        // Every case/fallthrough block is created before the switch is
        // built, so the switch instruction never needs to be retrofitted
        // before an already-emitted block.
        let mut group_case_bbs = Vec::with_capacity(by_tag.len());
        for _ in &by_tag {
            group_case_bbs.push(self.context.append_basic_block(fn_val, "match_arm"));
        }
        let cases: Vec<_> = by_tag
            .iter()
            .zip(&group_case_bbs)
            .map(|((tag_id, _), bb)| (self.context.i32_type().const_int(*tag_id, false), *bb))
            .collect();
        self.builder.build_switch(tag, default_bb, &cases)?;

        let mut all_terminated = true;
        for ((_, group), case_bb) in by_tag.iter().zip(&group_case_bbs) {
            self.builder.position_at_end(*case_bb);
            self.push_scope();
            let mut terminated = false;
            for (i, arm) in group.iter().enumerate() {
                let is_last = i + 1 == group.len();
                let next_bb = if is_last {
                    default_bb
                } else {
                    self.context.append_basic_block(fn_val, "match_fallthrough")
                };
                // Any nested `EnumVariant` sub-pattern branches straight to
                // `next_bb` on a runtime tag mismatch, leaving the builder
                // positioned past every check that passed — so the body
                // below always runs under a fully-matched arm.
                self.pattern_matches_payload(arm, slot, enum_ty, next_bb)?;
                terminated = self.emit_block(&arm.body)?;
                if !terminated {
                    self.builder.build_unconditional_branch(merge_bb)?;
                }
                if !is_last {
                    self.builder.position_at_end(next_bb);
                }
            }
            self.pop_scope()?;
            all_terminated &= terminated;
        }

        self.builder.position_at_end(default_bb);
        if let Some(arm) = wildcard_arm {
            self.push_scope();
            let terminated = self.emit_block(&arm.body)?;
            self.pop_scope()?;
            if !terminated {
                self.builder.build_unconditional_branch(merge_bb)?;
            }
            all_terminated &= terminated;
        } else {
            self.builder.build_unreachable()?;
        }

        self.builder.position_at_end(merge_bb);
        let fully_terminated = all_terminated && wildcard_arm.is_some();
        if fully_terminated {
            self.builder.build_unreachable()?;
        }
        Ok(fully_terminated)
    }

    fn variant_tag(&self, enum_name: &str, variant: &str) -> Result<u64, CodegenError> {
        let def = &self
            .tables
            .enums
            .get(enum_name)
            .ok_or_else(|| CodegenError::UndefinedName(enum_name.to_string()))?
            .def;
        def.variants
            .iter()
            .position(|v| v.name == variant)
            .map(|i| i as u64)
            .ok_or_else(|| CodegenError::UndefinedName(format!("{enum_name}.{variant}")))
    }

    /// Binds a matched arm's associated-type payloads from the scrutinee's
    /// byte array — offset advances by the size of the semantic type of
    /// each extracted field. The outer tag is already selected by the
    /// switch; any nested `EnumVariant` sub-pattern is checked here against
    /// `next_bb`, the fallthrough target for this arm's runtime mismatch.
    fn pattern_matches_payload(
        &mut self,
        arm: &MatchArm,
        slot: inkwell::values::PointerValue<'ctx>,
        enum_ty: inkwell::types::StructType<'ctx>,
        next_bb: BasicBlock<'ctx>,
    ) -> Result<(), CodegenError> {
        let Pattern::EnumVariant { enum_name, variant, bindings } = &arm.pattern else {
            return Ok(());
        };
        let target_enum = enum_name
            .clone()
            .ok_or_else(|| CodegenError::UnknownLayout(format!("unresolved enum for .{variant}")))?;
        let def = self
            .tables
            .enums
            .get(&target_enum)
            .ok_or_else(|| CodegenError::UndefinedName(target_enum.clone()))?
            .def
            .clone();
        let variant_def = def
            .variants
            .iter()
            .find(|v| &v.name == variant)
            .ok_or_else(|| CodegenError::UndefinedName(format!("{target_enum}.{variant}")))?
            .clone();

        let payload_ptr = self.builder.build_struct_gep(enum_ty, slot, 1, "arm_payload_ptr")?;
        let mut offset: u64 = 0;
        for (binding, field_ty) in bindings.iter().zip(variant_def.associated_types.iter()) {
            let field_llvm_ty = self.llvm_type(field_ty);
            let i8_t = self.context.i8_type();
            let field_ptr = unsafe {
                self.builder.build_gep(
                    i8_t,
                    payload_ptr,
                    &[self.context.i64_type().const_int(offset, false)],
                    "arm_field_ptr",
                )?
            };
            self.bind_pattern(binding, field_ptr, field_llvm_ty, field_ty, next_bb)?;
            offset += self.size_of_type(field_ty).max(1);
        }
        Ok(())
    }

    /// Binds a single pattern against an already-located field. `Own(inner)`
    /// unwraps the heap box first, then binds `inner` as if it were a plain
    /// pattern on `T`. A nested `EnumVariant` loads its own tag, branches to
    /// `next_bb` on a mismatch, and otherwise keeps binding its own payload
    /// — so every sub-pattern below a matched tag is bound by the time this
    /// returns, arbitrarily deep.
    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        field_ptr: inkwell::values::PointerValue<'ctx>,
        field_llvm_ty: inkwell::types::BasicTypeEnum<'ctx>,
        field_ty: &Type,
        next_bb: BasicBlock<'ctx>,
    ) -> Result<(), CodegenError> {
        match pattern {
            Pattern::Wildcard => Ok(()),
            Pattern::Binding(name) => {
                let alloca = self.builder.build_alloca(field_llvm_ty, name)?;
                let val = self.builder.build_load(field_llvm_ty, field_ptr, "pattern_field_val")?;
                self.builder.build_store(alloca, val)?;
                self.scope_stack.last_mut().expect("match arm scope").insert(
                    name.clone(),
                    VarSlot { ptr: alloca, ty: field_ty.clone(), is_param: false, moved: Cell::new(false) },
                );
                Ok(())
            }
            Pattern::Own(inner) => {
                let boxed_ptr = self.builder.build_load(self.i8_ptr(), field_ptr, "own_box_ptr")?.into_pointer_value();
                self.bind_pattern(inner, boxed_ptr, field_llvm_ty, field_ty, next_bb)
            }
            Pattern::EnumVariant { enum_name, variant, bindings } => {
                let nested_ty = field_llvm_ty.into_struct_type();
                let tag_ptr = self.builder.build_struct_gep(nested_ty, field_ptr, 0, "nested_tag_ptr")?;
                let tag = self.builder.build_load(self.context.i32_type(), tag_ptr, "nested_tag")?.into_int_value();

                let target_enum = enum_name.clone().unwrap_or_else(|| scrutinee_ty_name(field_ty));
                let expected_tag = self.variant_tag(&target_enum, variant)?;
                let tag_matches = self.eq_u32(tag, expected_tag);

                let fn_val = self.current_function.expect("inside a function body");
                let matched_bb = self.context.append_basic_block(fn_val, "nested_pattern_matched");
                self.builder.build_conditional_branch(tag_matches, matched_bb, next_bb)?;
                self.builder.position_at_end(matched_bb);

                let nested_def = self
                    .tables
                    .enums
                    .get(&target_enum)
                    .ok_or_else(|| CodegenError::UndefinedName(target_enum.clone()))?
                    .def
                    .clone();
                let nested_variant_def = nested_def
                    .variants
                    .iter()
                    .find(|v| &v.name == variant)
                    .ok_or_else(|| CodegenError::UndefinedName(format!("{target_enum}.{variant}")))?
                    .clone();

                let nested_payload_ptr =
                    self.builder.build_struct_gep(nested_ty, field_ptr, 1, "nested_payload_ptr")?;
                let mut offset: u64 = 0;
                for (inner_binding, inner_field_ty) in
                    bindings.iter().zip(nested_variant_def.associated_types.iter())
                {
                    let inner_llvm_ty = self.llvm_type(inner_field_ty);
                    let i8_t = self.context.i8_type();
                    let inner_field_ptr = unsafe {
                        self.builder.build_gep(
                            i8_t,
                            nested_payload_ptr,
                            &[self.context.i64_type().const_int(offset, false)],
                            "nested_field_ptr",
                        )?
                    };
                    self.bind_pattern(inner_binding, inner_field_ptr, inner_llvm_ty, inner_field_ty, next_bb)?;
                    offset += self.size_of_type(inner_field_ty).max(1);
                }
                Ok(())
            }
        }
    }

    fn emit_condition(&mut self, cond: &Expr) -> Result<inkwell::values::IntValue<'ctx>, CodegenError> {
        let val = self.emit_expr(cond)?;
        Ok(val.into_int_value())
    }
}

fn scrutinee_ty_name(ty: &Type) -> String {
    match ty {
        Type::Enum { name, .. } => name.clone(),
        _ => String::new(),
    }
}

fn is_hashmap_type(ty: &Type) -> bool {
    match ty {
        Type::Struct { name, .. } => name == "HashMap" || name.starts_with("HashMap<"),
        Type::GenericRef { base_name, .. } => base_name == "HashMap",
        _ => false,
    }
}
