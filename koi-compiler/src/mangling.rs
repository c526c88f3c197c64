//! Canonical type names and function name mangling (the canonical-naming invariant).
//!
//! Kept as pure functions rather than inlined substitution at each call
//! site, matching `sushi_lang/semantics/generics/name_mangling.py`'s
//! factoring (see DESIGN.md).

use koi_ast::Type;

/// `Base<arg1, arg2, ...>` using each argument's canonical spelling.
pub fn canonical_name(base: &str, args: &[Type]) -> String {
    if args.is_empty() {
        return base.to_string();
    }
    let joined = args
        .iter()
        .map(type_name)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{base}<{joined}>")
}

/// `base__arg1_arg2` with `<>,& *` sanitized, for LLVM-legal function names.
pub fn mangle_function(base: &str, args: &[Type]) -> String {
    if args.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push_str("__");
    let parts: Vec<String> = args.iter().map(mangle_type_name).collect();
    out.push_str(&parts.join("_"));
    out
}

/// A single type's canonical display spelling.
pub fn type_name(ty: &Type) -> String {
    match ty {
        Type::I8 => "i8".into(),
        Type::I16 => "i16".into(),
        Type::I32 => "i32".into(),
        Type::I64 => "i64".into(),
        Type::U8 => "u8".into(),
        Type::U16 => "u16".into(),
        Type::U32 => "u32".into(),
        Type::U64 => "u64".into(),
        Type::F32 => "f32".into(),
        Type::F64 => "f64".into(),
        Type::Bool => "bool".into(),
        Type::String => "string".into(),
        Type::Blank => "~".into(),
        Type::Stdin => "stdin".into(),
        Type::Stdout => "stdout".into(),
        Type::Stderr => "stderr".into(),
        Type::FileStream => "file".into(),
        Type::Array(elem, size) => format!("[{}; {}]", type_name(elem), size),
        Type::DynamicArray(elem) => format!("[{}]", type_name(elem)),
        Type::Struct { name, generic_args } => canonical_name(name, generic_args),
        Type::Enum { name, generic_args } => canonical_name(name, generic_args),
        Type::Reference { referenced, mode } => {
            let sigil = match mode {
                koi_ast::BorrowMode::Peek => "peek",
                koi_ast::BorrowMode::Poke => "poke",
            };
            format!("{sigil} {}", type_name(referenced))
        }
        Type::Pointer(inner) => format!("*{}", type_name(inner)),
        Type::Iterator(elem) => format!("Iterator<{}>", type_name(elem)),
        Type::GenericRef { base_name, type_args } => canonical_name(base_name, type_args),
        Type::TypeParameter(name) => name.clone(),
        Type::Result { ok, err } => canonical_name("Result", &[(**ok).clone(), (**err).clone()]),
        Type::Unknown(name) => name.clone(),
    }
}

/// Sanitizes a canonical type name for use inside a mangled identifier:
/// `<>,& *` and spaces are stripped/replaced, matching the canonical-naming invariant.
fn mangle_type_name(ty: &Type) -> String {
    type_name(ty)
        .chars()
        .map(|c| match c {
            '<' | '>' | ',' | '&' | '*' | ' ' => '_',
            other => other,
        })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_of_concrete_struct() {
        let name = canonical_name("Box", &[Type::I32]);
        assert_eq!(name, "Box<i32>");
    }

    #[test]
    fn mangle_function_sanitizes_brackets() {
        let mangled = mangle_function("identity", &[Type::I32]);
        assert_eq!(mangled, "identity__i32");
    }

    #[test]
    fn mangle_function_two_args() {
        let mangled = mangle_function(
            "make_pair",
            &[Type::String, Type::I32],
        );
        assert_eq!(mangled, "make_pair__string_i32");
    }

    #[test]
    fn mangle_nested_generic() {
        let list_of_box = Type::Struct {
            name: "List".to_string(),
            generic_args: vec![Type::Struct {
                name: "Box".to_string(),
                generic_args: vec![Type::I32],
            }],
        };
        let mangled = mangle_function("sum", std::slice::from_ref(&list_of_box));
        assert_eq!(mangled, "sum__List_Box_i32");
    }
}
