//! Expression emission, dispatched per-`ExprKind`, with signed/unsigned/
//! float binary-op selection driven by the operand's declared `Type`.

use super::{CodeGen, CodegenError};
use inkwell::types::BasicType;
use inkwell::values::{BasicValue, BasicValueEnum};
use inkwell::{FloatPredicate, IntPredicate};
use koi_ast::{Arg, BinOp, BorrowMode, Expr, ExprKind, Type, UnaryOp};

impl<'ctx> CodeGen<'ctx> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        match &expr.kind {
            ExprKind::IntLit(v) => {
                let ty = expr.resolved_type().unwrap_or(Type::I32);
                let llvm_int = self.llvm_type(&ty).into_int_type();
                Ok(llvm_int.const_int(*v as u64, ty.is_signed_int()).into())
            }
            ExprKind::FloatLit(v) => {
                let ty = expr.resolved_type().unwrap_or(Type::F64);
                Ok(self.llvm_type(&ty).into_float_type().const_float(*v).into())
            }
            ExprKind::BoolLit(v) => Ok(self.context.bool_type().const_int(*v as u64, false).into()),
            ExprKind::StringLit(s) => self.emit_string_literal(s),
            ExprKind::BlankLit => Ok(self.context.struct_type(&[], false).const_zero().into()),
            ExprKind::Identifier(name) => self.emit_identifier_load(name),
            ExprKind::Binary { op, left, right } => self.emit_binary(*op, left, right),
            ExprKind::Unary { op, expr } => self.emit_unary(*op, expr),
            ExprKind::Call { callee, args } => self.emit_call(callee, args),
            ExprKind::MethodCall { receiver, method, args } => {
                self.emit_method_call(receiver, method, args)
            }
            ExprKind::FieldAccess { receiver, field } => self.emit_field_access(receiver, field),
            ExprKind::Index { receiver, index } => self.emit_index(receiver, index),
            ExprKind::StructConstruct { name, args } => self.emit_struct_construct(name, args),
            ExprKind::EnumConstruct { enum_name, variant, args } => {
                self.emit_enum_construct(enum_name.as_deref(), variant, args)
            }
            ExprKind::Reference { mode, expr } => self.emit_reference(*mode, expr),
            ExprKind::Cast { expr, ty } => self.emit_cast(expr, ty),
            ExprKind::Try { expr } => self.emit_try(expr),
            ExprKind::ArrayLit(items) => self.emit_array_lit(items, expr.resolved_type()),
            ExprKind::FString(parts) => self.emit_fstring(parts),
        }
    }

    pub(crate) fn emit_string_literal(&mut self, s: &str) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let ptr = if let Some(p) = self.string_literals.get(s) {
            *p
        } else {
            let global = self.builder.build_global_string_ptr(s, "str_lit")?;
            let p = global.as_pointer_value();
            self.string_literals.insert(s.to_string(), p);
            p
        };
        let string_ty = self.llvm_type(&Type::String).into_struct_type();
        let len = self.context.i32_type().const_int(s.len() as u64, false);
        let fat_ptr = string_ty.const_named_struct(&[
            self.i8_ptr().const_zero().into(),
            len.into(),
        ]);
        let slot = self.builder.build_alloca(string_ty, "str_fat")?;
        self.builder.build_store(slot, fat_ptr)?;
        let ptr_field = self.builder.build_struct_gep(string_ty, slot, 0, "str_ptr_field")?;
        self.builder.build_store(ptr_field, ptr)?;
        Ok(self.builder.build_load(string_ty, slot, "str_val")?)
    }

    /// Name loads from the variable's alloca; reference *parameters* load
    /// once more (one extra indirection) — here that's any binding whose
    /// static type is itself a `Reference`, since peek/poke args are
    /// passed as raw pointers-to-the-referenced-storage.
    fn emit_identifier_load(&mut self, name: &str) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let slot = self
            .lookup_var(name)
            .ok_or_else(|| CodegenError::UndefinedName(name.to_string()))?;
        let llvm_ty = self.llvm_type(&slot.ty);
        let ptr = slot.ptr;
        Ok(self.builder.build_load(llvm_ty, ptr, name)?)
    }

    fn emit_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let lhs = self.emit_expr(left)?;
        let rhs = self.emit_expr(right)?;
        let operand_ty = left.resolved_type().or_else(|| right.resolved_type()).unwrap_or(Type::I32);

        if operand_ty.is_float() {
            return self.emit_float_binary(op, lhs.into_float_value(), rhs.into_float_value());
        }
        if matches!(operand_ty, Type::Bool) && matches!(op, BinOp::And | BinOp::Or) {
            return self.emit_bool_binary(op, lhs.into_int_value(), rhs.into_int_value());
        }
        // Integer path: sign of the declared type selects signed vs.
        // unsigned div/mod/comparison variants.
        self.emit_int_binary(op, lhs.into_int_value(), rhs.into_int_value(), operand_ty.is_signed_int())
    }

    fn emit_int_binary(
        &mut self,
        op: BinOp,
        l: inkwell::values::IntValue<'ctx>,
        r: inkwell::values::IntValue<'ctx>,
        signed: bool,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        use BinOp::*;
        let v = match op {
            Add => self.builder.build_int_add(l, r, "iadd")?,
            Sub => self.builder.build_int_sub(l, r, "isub")?,
            Mul => self.builder.build_int_mul(l, r, "imul")?,
            Div if signed => self.builder.build_int_signed_div(l, r, "isdiv")?,
            Div => self.builder.build_int_unsigned_div(l, r, "iudiv")?,
            Mod if signed => self.builder.build_int_signed_rem(l, r, "isrem")?,
            Mod => self.builder.build_int_unsigned_rem(l, r, "iurem")?,
            BitAnd => self.builder.build_and(l, r, "iand")?,
            BitOr => self.builder.build_or(l, r, "ior")?,
            BitXor => self.builder.build_xor(l, r, "ixor")?,
            Shl => self.builder.build_left_shift(l, r, "ishl")?,
            Shr if signed => self.builder.build_right_shift(l, r, true, "iashr")?,
            Shr => self.builder.build_right_shift(l, r, false, "ilshr")?,
            Eq => self.builder.build_int_compare(IntPredicate::EQ, l, r, "ieq")?,
            Ne => self.builder.build_int_compare(IntPredicate::NE, l, r, "ine")?,
            Lt if signed => self.builder.build_int_compare(IntPredicate::SLT, l, r, "ilt")?,
            Lt => self.builder.build_int_compare(IntPredicate::ULT, l, r, "ilt")?,
            Le if signed => self.builder.build_int_compare(IntPredicate::SLE, l, r, "ile")?,
            Le => self.builder.build_int_compare(IntPredicate::ULE, l, r, "ile")?,
            Gt if signed => self.builder.build_int_compare(IntPredicate::SGT, l, r, "igt")?,
            Gt => self.builder.build_int_compare(IntPredicate::UGT, l, r, "igt")?,
            Ge if signed => self.builder.build_int_compare(IntPredicate::SGE, l, r, "ige")?,
            Ge => self.builder.build_int_compare(IntPredicate::UGE, l, r, "ige")?,
            And => self.builder.build_and(l, r, "iand")?,
            Or => self.builder.build_or(l, r, "ior")?,
        };
        Ok(v.as_basic_value_enum())
    }

    fn emit_float_binary(
        &mut self,
        op: BinOp,
        l: inkwell::values::FloatValue<'ctx>,
        r: inkwell::values::FloatValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        use BinOp::*;
        let v: BasicValueEnum = match op {
            Add => self.builder.build_float_add(l, r, "fadd")?.into(),
            Sub => self.builder.build_float_sub(l, r, "fsub")?.into(),
            Mul => self.builder.build_float_mul(l, r, "fmul")?.into(),
            Div => self.builder.build_float_div(l, r, "fdiv")?.into(),
            Mod => self.builder.build_float_rem(l, r, "frem")?.into(),
            Eq => self.builder.build_float_compare(FloatPredicate::OEQ, l, r, "feq")?.into(),
            Ne => self.builder.build_float_compare(FloatPredicate::ONE, l, r, "fne")?.into(),
            Lt => self.builder.build_float_compare(FloatPredicate::OLT, l, r, "flt")?.into(),
            Le => self.builder.build_float_compare(FloatPredicate::OLE, l, r, "fle")?.into(),
            Gt => self.builder.build_float_compare(FloatPredicate::OGT, l, r, "fgt")?.into(),
            Ge => self.builder.build_float_compare(FloatPredicate::OGE, l, r, "fge")?.into(),
            And | Or | BitAnd | BitOr | BitXor | Shl | Shr => {
                return Err(CodegenError::UnknownLayout("bitwise op on float operand".to_string()))
            }
        };
        Ok(v)
    }

    fn emit_bool_binary(
        &mut self,
        op: BinOp,
        l: inkwell::values::IntValue<'ctx>,
        r: inkwell::values::IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let v = match op {
            BinOp::And => self.builder.build_and(l, r, "land")?,
            BinOp::Or => self.builder.build_or(l, r, "lor")?,
            _ => unreachable!("emit_bool_binary only called for And/Or"),
        };
        Ok(v.into())
    }

    fn emit_unary(&mut self, op: UnaryOp, inner: &Expr) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let v = self.emit_expr(inner)?;
        let ty = inner.resolved_type().unwrap_or(Type::I32);
        let out = match op {
            UnaryOp::Not => self.builder.build_not(v.into_int_value(), "lnot")?.into(),
            UnaryOp::BitNot => self.builder.build_not(v.into_int_value(), "bitnot")?.into(),
            UnaryOp::Neg if ty.is_float() => {
                self.builder.build_float_neg(v.into_float_value(), "fneg")?.into()
            }
            UnaryOp::Neg => self.builder.build_int_neg(v.into_int_value(), "ineg")?.into(),
        };
        Ok(out)
    }

    /// Member access on a dynamic-array field returns a pointer so
    /// mutating method calls can target it in place; other fields are
    /// extract-value of the loaded struct.
    fn emit_field_access(
        &mut self,
        receiver: &Expr,
        field: &str,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let recv_ty = receiver.resolved_type().ok_or_else(|| {
            CodegenError::UnknownLayout(format!("unresolved receiver type for .{field}"))
        })?;
        let struct_name = match &recv_ty {
            Type::Struct { name, .. } => name.clone(),
            Type::Reference { referenced, .. } => match referenced.as_ref() {
                Type::Struct { name, .. } => name.clone(),
                other => return Err(CodegenError::UnknownLayout(format!("{other:?}"))),
            },
            other => return Err(CodegenError::UnknownLayout(format!("{other:?}"))),
        };
        let entry = self
            .tables
            .structs
            .get(&struct_name)
            .ok_or_else(|| CodegenError::UndefinedName(struct_name.clone()))?;
        let (index, field_ty) = entry
            .def
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == field)
            .map(|(i, f)| (i as u32, f.ty.clone()))
            .ok_or_else(|| CodegenError::UndefinedName(format!("{struct_name}.{field}")))?;

        let recv_ptr = self.emit_lvalue(receiver)?;
        let struct_ty = self.llvm_type(&Type::Struct { name: struct_name, generic_args: vec![] })
            .into_struct_type();
        let field_ptr = self.builder.build_struct_gep(struct_ty, recv_ptr, index, "field_ptr")?;
        if matches!(field_ty, Type::DynamicArray(_)) {
            Ok(field_ptr.as_basic_value_enum())
        } else {
            let field_llvm_ty = self.llvm_type(&field_ty);
            Ok(self.builder.build_load(field_llvm_ty, field_ptr, "field_val")?)
        }
    }

    /// Produces the address of an expression that denotes storage (an
    /// identifier or a chain of field/index accesses on one), used by
    /// `emit_field_access`, `emit_index`, and `&peek`/`&poke`.
    pub(crate) fn emit_lvalue(
        &mut self,
        expr: &Expr,
    ) -> Result<inkwell::values::PointerValue<'ctx>, CodegenError> {
        match &expr.kind {
            ExprKind::Identifier(name) => Ok(self
                .lookup_var(name)
                .ok_or_else(|| CodegenError::UndefinedName(name.clone()))?
                .ptr),
            ExprKind::FieldAccess { receiver, field } => {
                let recv_ty = receiver.resolved_type().ok_or_else(|| {
                    CodegenError::UnknownLayout(format!("unresolved receiver type for .{field}"))
                })?;
                let struct_name = match &recv_ty {
                    Type::Struct { name, .. } => name.clone(),
                    Type::Reference { referenced, .. } => match referenced.as_ref() {
                        Type::Struct { name, .. } => name.clone(),
                        other => return Err(CodegenError::UnknownLayout(format!("{other:?}"))),
                    },
                    other => return Err(CodegenError::UnknownLayout(format!("{other:?}"))),
                };
                let entry = self
                    .tables
                    .structs
                    .get(&struct_name)
                    .ok_or_else(|| CodegenError::UndefinedName(struct_name.clone()))?;
                let index = entry
                    .def
                    .fields
                    .iter()
                    .position(|f| &f.name == field)
                    .ok_or_else(|| CodegenError::UndefinedName(format!("{struct_name}.{field}")))?
                    as u32;
                let recv_ptr = self.emit_lvalue(receiver)?;
                let struct_ty =
                    self.llvm_type(&Type::Struct { name: struct_name, generic_args: vec![] })
                        .into_struct_type();
                Ok(self.builder.build_struct_gep(struct_ty, recv_ptr, index, "field_lvalue")?)
            }
            _ => Err(CodegenError::UnknownLayout("expression is not an lvalue".to_string())),
        }
    }

    /// Bounds-checked index: compares against the compile-time size (fixed
    /// arrays) or the runtime `len` field (dynamic arrays) and calls the
    /// runtime bounds-error helper on failure.
    fn emit_index(
        &mut self,
        receiver: &Expr,
        index: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let idx = self.emit_expr(index)?.into_int_value();
        let recv_ty = receiver.resolved_type().ok_or_else(|| {
            CodegenError::UnknownLayout("unresolved receiver type for index".to_string())
        })?;
        let i32_t = self.context.i32_type();
        let idx32 = self.builder.build_int_cast(idx, i32_t, "idx32")?;

        match recv_ty {
            Type::Array(elem, len) => {
                let fn_val = self.current_function.expect("inside a function body");
                let len_const = i32_t.const_int(len as u64, false);
                let in_bounds =
                    self.builder.build_int_compare(IntPredicate::ULT, idx32, len_const, "in_bounds")?;
                let ok_bb = self.context.append_basic_block(fn_val, "idx_ok");
                let bad_bb = self.context.append_basic_block(fn_val, "idx_oob");
                self.builder.build_conditional_branch(in_bounds, ok_bb, bad_bb)?;
                self.builder.position_at_end(bad_bb);
                self.emit_bounds_error()?;
                self.builder.position_at_end(ok_bb);

                let recv_ptr = self.emit_lvalue(receiver)?;
                let array_ty = self.llvm_type(&Type::Array(elem.clone(), len)).into_array_type();
                let elem_ptr = unsafe {
                    self.builder.build_gep(
                        array_ty,
                        recv_ptr,
                        &[i32_t.const_zero(), idx32],
                        "elem_ptr",
                    )?
                };
                let elem_ty = self.llvm_type(&elem);
                Ok(self.builder.build_load(elem_ty, elem_ptr, "elem_val")?)
            }
            Type::DynamicArray(elem) => {
                let recv_ptr = self.emit_lvalue(receiver)?;
                let array_struct_ty = self.llvm_type(&Type::DynamicArray(elem.clone())).into_struct_type();
                let len_ptr = self.builder.build_struct_gep(array_struct_ty, recv_ptr, 0, "len_ptr")?;
                let len_val = self.builder.build_load(i32_t, len_ptr, "len_val")?.into_int_value();
                let in_bounds =
                    self.builder.build_int_compare(IntPredicate::ULT, idx32, len_val, "in_bounds")?;
                let fn_val = self.current_function.expect("inside a function body");
                let ok_bb = self.context.append_basic_block(fn_val, "idx_ok");
                let bad_bb = self.context.append_basic_block(fn_val, "idx_oob");
                self.builder.build_conditional_branch(in_bounds, ok_bb, bad_bb)?;
                self.builder.position_at_end(bad_bb);
                self.emit_bounds_error()?;
                self.builder.position_at_end(ok_bb);

                let data_ptr_slot = self.builder.build_struct_gep(array_struct_ty, recv_ptr, 2, "data_ptr_slot")?;
                let elem_llvm_ty = self.llvm_type(&elem);
                let data_ptr = self
                    .builder
                    .build_load(self.i8_ptr(), data_ptr_slot, "data_ptr")?
                    .into_pointer_value();
                let elem_ptr =
                    unsafe { self.builder.build_gep(elem_llvm_ty, data_ptr, &[idx32], "dyn_elem_ptr")? };
                Ok(self.builder.build_load(elem_llvm_ty, elem_ptr, "elem_val")?)
            }
            other => Err(CodegenError::UnknownLayout(format!("index into {other:?}"))),
        }
    }

    fn emit_bounds_error(&mut self) -> Result<(), CodegenError> {
        let msg = self.builder.build_global_string_ptr("index out of bounds\n", "oob_msg")?;
        let stderr_fn = self.runtime_fns.get("fprintf").copied();
        if let Some(fprintf) = stderr_fn {
            let stderr_ptr = self.i8_ptr().const_zero();
            self.builder.build_call(
                fprintf,
                &[stderr_ptr.into(), msg.as_pointer_value().into()],
                "report_oob",
            )?;
        }
        self.builder.build_unreachable()?;
        Ok(())
    }

    /// `sext`/`zext` for integer widening per the *source*'s signedness,
    /// `sitofp`/`fptosi` across the int/float boundary, `fpext`/`fptrunc`
    /// for float-to-float.
    fn emit_cast(&mut self, inner: &Expr, target: &Type) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let value = self.emit_expr(inner)?;
        let source = inner.resolved_type().unwrap_or(Type::I32);
        let target_llvm = self.llvm_type(target);

        let out = match (&source, target) {
            (s, t) if s.is_integer() && t.is_integer() => {
                let int_val = value.into_int_value();
                let target_int = target_llvm.into_int_type();
                if s.is_signed_int() {
                    self.builder.build_int_s_extend_or_bit_cast(int_val, target_int, "sext")?.into()
                } else {
                    self.builder.build_int_z_extend_or_bit_cast(int_val, target_int, "zext")?.into()
                }
            }
            (s, t) if s.is_integer() && t.is_float() => {
                let int_val = value.into_int_value();
                let target_float = target_llvm.into_float_type();
                if s.is_signed_int() {
                    self.builder.build_signed_int_to_float(int_val, target_float, "sitofp")?.into()
                } else {
                    self.builder.build_unsigned_int_to_float(int_val, target_float, "uitofp")?.into()
                }
            }
            (s, t) if s.is_float() && t.is_integer() => {
                let float_val = value.into_float_value();
                let target_int = target_llvm.into_int_type();
                if t.is_signed_int() {
                    self.builder.build_float_to_signed_int(float_val, target_int, "fptosi")?.into()
                } else {
                    self.builder.build_float_to_unsigned_int(float_val, target_int, "fptoui")?.into()
                }
            }
            (s, t) if s.is_float() && t.is_float() => {
                let float_val = value.into_float_value();
                let target_float = target_llvm.into_float_type();
                self.builder.build_float_cast(float_val, target_float, "fcast")?.into()
            }
            (Type::Bool, t) if t.is_integer() => {
                let int_val = value.into_int_value();
                self.builder.build_int_z_extend(int_val, target_llvm.into_int_type(), "bool_zext")?.into()
            }
            (s, Type::Bool) if s.is_integer() => {
                let int_val = value.into_int_value();
                let zero = int_val.get_type().const_zero();
                self.builder.build_int_compare(IntPredicate::NE, int_val, zero, "bool_from_int")?.into()
            }
            _ => value,
        };
        Ok(out)
    }

    /// `&peek`/`&poke` produce the referenced storage's address; the
    /// peek/poke distinction is purely a Pass 3 compile-time concern —
    /// both modes are zero-cost pointers at this level.
    fn emit_reference(
        &mut self,
        _mode: BorrowMode,
        inner: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        Ok(self.emit_lvalue(inner)?.as_basic_value_enum())
    }

    /// `Try`: evaluate inner, extract tag, branch on success vs. failure.
    /// On success the block continues with the extracted payload; on
    /// failure, current-frame RAII cleanup runs and an `Err` is returned,
    /// reconverted into the enclosing function's `Result` type via the
    /// `TryAnnotation` Pass 2 already attached.
    fn emit_try(&mut self, inner: &Expr) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let annotation = inner
            .try_annotation
            .borrow()
            .clone()
            .ok_or_else(|| CodegenError::UnknownLayout("`??` missing its TryAnnotation".to_string()))?;

        let inner_val = self.emit_expr(inner)?.into_struct_value();
        let inner_llvm_ty = self.llvm_type(&annotation.inner_type).into_struct_type();
        let slot = self.builder.build_alloca(inner_llvm_ty, "try_tmp")?;
        self.builder.build_store(slot, inner_val)?;
        let tag_ptr = self.builder.build_struct_gep(inner_llvm_ty, slot, 0, "try_tag_ptr")?;
        let tag = self.builder.build_load(self.context.i32_type(), tag_ptr, "try_tag")?.into_int_value();

        let ok_tag = self.context.i32_type().const_int(annotation.ok_tag as u64, false);
        let is_ok = self.builder.build_int_compare(IntPredicate::EQ, tag, ok_tag, "try_is_ok")?;

        let fn_val = self.current_function.expect("inside a function body");
        let ok_bb = self.context.append_basic_block(fn_val, "try_ok");
        let err_bb = self.context.append_basic_block(fn_val, "try_err");
        let merge_bb = self.context.append_basic_block(fn_val, "try_merge");
        self.builder.build_conditional_branch(is_ok, ok_bb, err_bb)?;

        self.builder.position_at_end(ok_bb);
        let payload_ptr = self.builder.build_struct_gep(inner_llvm_ty, slot, 1, "try_ok_payload_ptr")?;
        let ok_llvm_ty = self.llvm_type(&annotation.ok_type);
        let ok_val = self.builder.build_load(ok_llvm_ty, payload_ptr, "try_ok_val")?;
        self.builder.build_unconditional_branch(merge_bb)?;

        self.builder.position_at_end(err_bb);
        let err_payload_ptr = self.builder.build_struct_gep(inner_llvm_ty, slot, 1, "try_err_payload_ptr")?;
        let err_llvm_ty = self.llvm_type(&annotation.err_type);
        let err_val = self.builder.build_load(err_llvm_ty, err_payload_ptr, "try_err_val")?;
        self.emit_scope_cleanup_all();
        let (enclosing_ok, enclosing_err) = match &annotation.enclosing_return_type {
            Type::Result { ok, err } => ((**ok).clone(), (**err).clone()),
            other => (other.clone(), annotation.err_type.clone()),
        };
        let wrapped_err = self.build_err_result(&enclosing_ok, &enclosing_err, err_val)?;
        self.builder.build_return(Some(&wrapped_err))?;

        self.builder.position_at_end(merge_bb);
        Ok(ok_val)
    }

    fn emit_array_lit(
        &mut self,
        items: &[Expr],
        resolved: Option<Type>,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let elem_ty = match resolved {
            Some(Type::Array(elem, _)) => (*elem).clone(),
            Some(Type::DynamicArray(elem)) => (*elem).clone(),
            _ => items.first().and_then(|e| e.resolved_type()).unwrap_or(Type::I32),
        };
        let llvm_elem = self.llvm_type(&elem_ty);
        let array_ty = llvm_elem.array_type(items.len() as u32);
        let slot = self.builder.build_alloca(array_ty, "array_lit")?;
        let i32_t = self.context.i32_type();
        for (i, item) in items.iter().enumerate() {
            let val = self.emit_expr(item)?;
            let idx = i32_t.const_int(i as u64, false);
            let elem_ptr =
                unsafe { self.builder.build_gep(array_ty, slot, &[i32_t.const_zero(), idx], "lit_elem")? };
            self.builder.build_store(elem_ptr, val)?;
        }
        Ok(self.builder.build_load(array_ty, slot, "array_lit_val")?)
    }

    /// String interpolation/concatenation uses the string fat-pointer and
    /// `fprintf`-backed formatting helpers; each piece is concatenated
    /// left-to-right via the runtime string-append helper.
    fn emit_fstring(&mut self, parts: &[koi_ast::FStringPart]) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let mut acc: Option<BasicValueEnum<'ctx>> = None;
        for part in parts {
            let piece = match part {
                koi_ast::FStringPart::Literal(s) => self.emit_string_literal(s)?,
                koi_ast::FStringPart::Expr(e) => {
                    let v = self.emit_expr(e)?;
                    let ty = e.resolved_type().unwrap_or(Type::String);
                    self.builtin_to_string(&ty, v)?
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => self.builtin_string_concat(prev, piece)?,
            });
        }
        match acc {
            Some(v) => Ok(v),
            None => self.emit_string_literal(""),
        }
    }

    /// `Call`: resolve the mangled symbol and cast each argument to the
    /// parameter's LLVM type.
    fn emit_call(&mut self, callee: &Expr, args: &[Arg]) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        if let Some(result) = self.try_emit_builtin_static_call(callee, args)? {
            return Ok(result);
        }
        let ExprKind::Identifier(name) = &callee.kind else {
            return Err(CodegenError::UnknownLayout("call through a non-identifier callee".to_string()));
        };

        if let Some(stdlib_fn) = self.stdlib.lookup(name).cloned() {
            return self.emit_stdlib_call(&stdlib_fn, args);
        }

        // Pass 2 records the monomorphized mangled name on `callee` itself
        // for a generic call site; a bare identifier call otherwise
        // resolves straight to a declared function symbol.
        let fn_val = match callee.mangled_callee() {
            Some(mangled) => *self
                .functions
                .get(&mangled)
                .ok_or_else(|| CodegenError::UndefinedName(mangled))?,
            None => *self
                .functions
                .get(name)
                .ok_or_else(|| CodegenError::UndefinedName(name.clone()))?,
        };

        let mut arg_vals = Vec::with_capacity(args.len());
        for arg in args {
            arg_vals.push(self.emit_expr(arg.value())?.into());
        }
        let call = self.builder.build_call(fn_val, &arg_vals, "call")?;
        Ok(call
            .try_as_basic_value()
            .left()
            .unwrap_or_else(|| self.context.struct_type(&[], false).const_zero().into()))
    }

    fn emit_stdlib_call(
        &mut self,
        stdlib_fn: &crate::stdlib::StdlibFunction,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        if stdlib_fn.module_path == "print" || stdlib_fn.module_path == "println" {
            let value = self.emit_expr(args[0].value())?;
            let newline = stdlib_fn.module_path == "println";
            return self.emit_print(value, newline);
        }
        let symbol = stdlib_fn.llvm_symbol;
        let fn_val = match self.runtime_fns.get(symbol) {
            Some(f) => *f,
            None => {
                let param_tys: Vec<_> =
                    stdlib_fn.params.iter().map(|t| self.llvm_type(t).into()).collect();
                let ret_ty = self.llvm_type(&stdlib_fn.return_type);
                let fn_type = ret_ty.fn_type(&param_tys, false);
                let f = self.module.add_function(
                    symbol,
                    fn_type,
                    Some(inkwell::module::Linkage::External),
                );
                self.runtime_fns.insert(Self::leak_symbol(symbol), f);
                f
            }
        };
        let mut arg_vals = Vec::with_capacity(args.len());
        for arg in args {
            arg_vals.push(self.emit_expr(arg.value())?.into());
        }
        let call = self.builder.build_call(fn_val, &arg_vals, "stdlib_call")?;
        Ok(call
            .try_as_basic_value()
            .left()
            .unwrap_or_else(|| self.context.struct_type(&[], false).const_zero().into()))
    }

    /// Leaks the symbol name so it can serve as a `'static str` cache key
    /// alongside the hand-written entries in `declare_runtime_helpers`;
    /// each distinct math-intrinsic symbol is declared at most once per
    /// module regardless.
    fn leak_symbol(s: &str) -> &'static str {
        Box::leak(s.to_string().into_boxed_str())
    }

    fn emit_print(
        &mut self,
        value: BasicValueEnum<'ctx>,
        newline: bool,
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let string_ty = self.llvm_type(&Type::String).into_struct_type();
        let slot = self.builder.build_alloca(string_ty, "print_arg")?;
        self.builder.build_store(slot, value)?;
        let ptr_field = self.builder.build_struct_gep(string_ty, slot, 0, "print_ptr_field")?;
        let data_ptr = self.builder.build_load(self.i8_ptr(), ptr_field, "print_data_ptr")?;

        let fmt = if newline { "%s\n" } else { "%s" };
        let fmt_ptr = self.builder.build_global_string_ptr(fmt, "print_fmt")?;
        let fprintf = self.runtime_fns["fprintf"];
        let stderr_stream = self.i8_ptr().const_zero();
        self.builder.build_call(
            fprintf,
            &[stderr_stream.into(), fmt_ptr.as_pointer_value().into(), data_ptr.into()],
            "print_call",
        )?;
        Ok(self.context.struct_type(&[], false).const_zero().into())
    }

    fn emit_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let recv_ty = receiver.resolved_type().ok_or_else(|| {
            CodegenError::UnknownLayout(format!("unresolved receiver type for .{method}"))
        })?;

        if let Some(result) = self.try_emit_builtin_method(receiver, &recv_ty, method, args)? {
            return Ok(result);
        }

        let type_name = crate::mangling::type_name(&recv_ty);
        let symbol = format!("{type_name}__{method}");
        let fn_val = *self
            .functions
            .get(&symbol)
            .ok_or_else(|| CodegenError::UndefinedName(symbol.clone()))?;

        let recv_val = self.emit_expr(receiver)?;
        let mut arg_vals = vec![recv_val.into()];
        for arg in args {
            arg_vals.push(self.emit_expr(arg.value())?.into());
        }
        let call = self.builder.build_call(fn_val, &arg_vals, "method_call")?;
        Ok(call
            .try_as_basic_value()
            .left()
            .unwrap_or_else(|| self.context.struct_type(&[], false).const_zero().into()))
    }

    fn emit_struct_construct(
        &mut self,
        name: &str,
        args: &[Arg],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let struct_ty = self
            .struct_types
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UndefinedName(name.to_string()))?;
        let slot = self.builder.build_alloca(struct_ty, "struct_lit")?;
        let ordered = self.order_struct_args(name, args);
        for (i, arg) in ordered.into_iter().enumerate() {
            let val = self.emit_expr(arg.value())?;
            // Struct-constructor arguments that are local move-only
            // variables are moved into the new struct.
            if let ExprKind::Identifier(src_name) = &arg.value().kind {
                if matches!(arg.value().resolved_type(), Some(Type::DynamicArray(_))) {
                    self.mark_moved(src_name);
                }
            }
            let field_ptr = self.builder.build_struct_gep(struct_ty, slot, i as u32, "ctor_field")?;
            self.builder.build_store(field_ptr, val)?;
        }
        Ok(self.builder.build_load(struct_ty, slot, "struct_lit_val")?)
    }

    /// Mirrors `order_struct_args` in the type checker: when any arg is
    /// `field: value`, field order wins over source order.
    fn order_struct_args<'a>(&self, struct_name: &str, args: &'a [Arg]) -> Vec<&'a Arg> {
        if !args.iter().any(|a| matches!(a, Arg::Named { .. })) {
            return args.iter().collect();
        }
        let fields = self
            .tables
            .structs
            .get(struct_name)
            .map(|e| e.def.fields.clone())
            .unwrap_or_default();
        let mut slots: Vec<Option<&Arg>> = vec![None; fields.len()];
        let mut leftover: Vec<&Arg> = Vec::new();
        for arg in args {
            match arg {
                Arg::Named { name, .. } => match fields.iter().position(|f| &f.name == name) {
                    Some(idx) => slots[idx] = Some(arg),
                    None => leftover.push(arg),
                },
                Arg::Positional(_) => leftover.push(arg),
            }
        }
        let mut leftover = leftover.into_iter();
        slots.into_iter().filter_map(|slot| slot.or_else(|| leftover.next())).collect()
    }

    /// Builds an enum value of `enum_name` tagged for `variant`, with the
    /// payload bytes holding each associated value back-to-back (every
    /// enum is laid out `{i32, [N x i8]}`).
    fn emit_enum_construct(
        &mut self,
        enum_name: Option<&str>,
        variant: &str,
        args: &[Expr],
    ) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        let enum_name = enum_name
            .ok_or_else(|| CodegenError::UnknownLayout(format!("unresolved enum for .{variant}(..)")))?;
        let enum_ty = self
            .enum_types
            .get(enum_name)
            .copied()
            .ok_or_else(|| CodegenError::UndefinedName(enum_name.to_string()))?;
        let def = self
            .tables
            .enums
            .get(enum_name)
            .ok_or_else(|| CodegenError::UndefinedName(enum_name.to_string()))?
            .def
            .clone();
        let tag = def
            .variants
            .iter()
            .position(|v| v.name == variant)
            .ok_or_else(|| CodegenError::UndefinedName(format!("{enum_name}.{variant}")))?;

        let slot = self.builder.build_alloca(enum_ty, "enum_lit")?;
        let tag_ptr = self.builder.build_struct_gep(enum_ty, slot, 0, "enum_tag_ptr")?;
        self.builder.build_store(tag_ptr, self.context.i32_type().const_int(tag as u64, false))?;
        let payload_ptr = self.builder.build_struct_gep(enum_ty, slot, 1, "enum_payload_ptr")?;

        let mut byte_offset: u64 = 0;
        for arg in args {
            let val = self.emit_expr(arg)?;
            let arg_ty = arg.resolved_type().unwrap_or(Type::Blank);
            let elem_ty = self.llvm_type(&arg_ty);
            let i8_t = self.context.i8_type();
            let field_ptr = unsafe {
                self.builder.build_gep(
                    i8_t,
                    payload_ptr,
                    &[self.context.i64_type().const_int(byte_offset, false)],
                    "enum_field_ptr",
                )?
            };
            self.builder.build_store(field_ptr, val)?;
            byte_offset += self.size_of_type(&arg_ty).max(1);
            let _ = elem_ty;
        }
        Ok(self.builder.build_load(enum_ty, slot, "enum_lit_val")?)
    }
}
