//! Prints the NodeRefresh CRD manifest as YAML, for applying out-of-band.

use kube::CustomResourceExt;

fn main() {
    match serde_yaml::to_string(&crds::NodeRefresh::crd()) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("failed to render NodeRefresh CRD: {e}");
            std::process::exit(1);
        }
    }
}
