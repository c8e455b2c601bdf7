unit! {
    system: uom::si;
    quantity: uom::si::ratio;

    @cpu: prefix!(none); "cpu", "cpu", "cpus";
    @millicpu: prefix!(milli); "mcpu", "millicpu", "millicpus";
    @nanocpu: prefix!(nano); "ncpu", "nanocpu", "nanocpus";
}
