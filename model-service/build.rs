fn main() -> Result<(), Box<dyn std::error::Error>> {
    // protoc and the well-known types come from protoc-bin-vendored.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let well_known = protoc_bin_vendored::include_path()?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["proto/instill/model/v1alpha/model_service.proto"],
            &[std::path::PathBuf::from("proto"), well_known],
        )?;

    println!("cargo:rerun-if-changed=proto/");
    Ok(())
}
