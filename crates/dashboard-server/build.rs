fn main() {
    // Re-embed the dashboard UI when its files change
    println!("cargo:rerun-if-changed=../../frontend/index.html");
    println!("cargo:rerun-if-changed=../../frontend/app.js");
    println!("cargo:rerun-if-changed=../../frontend/style.css");
}
