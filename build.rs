fn main() {
    // ESP-IDF environment is only needed for the Xtensa device target;
    // host builds and tests skip it.
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("xtensa") {
        embuild::espidf::sysenv::output();
    }
}
