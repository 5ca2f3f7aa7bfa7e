fn main() -> anyhow::Result<()> {
    particlefield::run()
}
