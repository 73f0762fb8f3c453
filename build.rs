//! Compiles `proto/cron.proto` into the `rpc` module included by `src/lib.rs`.
//!
//! Requires `protoc` on the build host.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/cron.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/cron.proto");
    Ok(())
}
