use {
    crate::{codegen, BackendConfig, BackendError},
    cranelift_object::{ObjectBuilder, ObjectModule},
    middle::ir,
};

/// Lowers `module` to a relocatable object file for the host target.
///
/// The object exports `bf_main(env) -> i32` and leaves `bf_write_byte`,
/// `bf_read_byte`, `calloc` and `free` for the linker to resolve.
pub fn serialize(module: &ir::Module, config: &BackendConfig) -> Result<Vec<u8>, BackendError> {
    let isa = codegen::host_isa(config, true)?;
    let builder = ObjectBuilder::new(
        isa,
        module.name.as_str(),
        cranelift_module::default_libcall_names(),
    )
    .map_err(BackendError::module)?;
    let mut object_module = ObjectModule::new(builder);
    codegen::define(&mut object_module, module)?;
    let bytes = object_module
        .finish()
        .emit()
        .map_err(|detail| BackendError::ObjectEmit {
            detail: detail.to_string(),
        })?;
    tracing::debug!(bytes = bytes.len(), "emitted object file");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use {super::*, frontend::ValidatedProgram};

    fn module(src: &str) -> ir::Module {
        let validated = ValidatedProgram::try_from(src).unwrap();
        ir::Module::try_from(&validated).unwrap().with_name("test")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[test]
    fn object_names_the_entry_point_and_imports() {
        let bytes = serialize(&module(",[.,]"), &BackendConfig::default()).unwrap();
        assert!(!bytes.is_empty());
        for symbol in ["bf_main", "bf_write_byte", "bf_read_byte", "calloc", "free"] {
            assert!(contains(&bytes, symbol.as_bytes()), "missing symbol {symbol}");
        }
    }

    #[test]
    fn serialization_is_deterministic() {
        let module = module("++[>++[>+<-]<-]>>.");
        let config = BackendConfig::default();
        assert_eq!(
            serialize(&module, &config).unwrap(),
            serialize(&module, &config).unwrap()
        );
    }

    #[test]
    fn unoptimized_objects_are_supported() {
        let config = BackendConfig {
            opt_level: crate::OptLevel::None,
        };
        assert!(!serialize(&module("+[-]"), &config).unwrap().is_empty());
    }
}
