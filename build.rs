pub fn main() {
    // defmt 配置
    println!("cargo:rerun-if-env-changed=DEFMT_LOG");

    // 链接脚本只对裸机目标生效，宿主机测试构建不带
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
    }
}
