#[macro_export]
macro_rules! shader_template_replacements {
    ($($label:literal => $replacement:expr),* $(,)?) => {
        [$(($label, ($replacement).to_string())),*]
    };
}

/// Asserts at compile time that the size of the given uniform type is a
/// multiple of 16 bytes, as required for uniform buffer bindings.
#[macro_export]
macro_rules! assert_uniform_valid {
    ($uniform:ty) => {
        const _: () = assert!(::std::mem::size_of::<$uniform>() % 16 == 0);
    };
}
