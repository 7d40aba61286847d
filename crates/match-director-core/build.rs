/// Builds the gRPC client and server code for the backend API definitions
/// using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`.
///
/// # Serde Support
///
/// Every message in the `api` package derives `serde::Serialize`. The fleet
/// allocator attaches a match's pools and rosters to the allocation request as
/// JSON annotations, so the generated types must be serializable without a
/// second set of hand-written mirror structs.
///
/// # Files and Paths
///
/// - Proto files: `proto/backend.proto` (imports `proto/messages.proto`)
/// - Includes: `proto/`
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("api");
/// }
/// ```
fn main() {
    println!("cargo:rerun-if-changed=proto");

    tonic_prost_build::configure()
        .type_attribute(".api", "#[derive(serde::Serialize)]")
        .type_attribute(".api", "#[serde(rename_all = \"camelCase\")]")
        .compile_protos(
            &["proto/backend.proto", "proto/messages.proto"],
            &["proto"],
        )
        .unwrap();
}
